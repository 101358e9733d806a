use crate::Stage;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	/// The mandatory vector search could not be served.
	#[error("Retrieval unavailable: {message}")]
	RetrievalUnavailable { message: String },
	/// An optional stage failed while strict mode is on.
	#[error("Stage {stage} degraded: {message}")]
	Degraded { stage: Stage, message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<grove_storage::Error> for Error {
	fn from(err: grove_storage::Error) -> Self {
		match err {
			grove_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			grove_storage::Error::Serde(inner) => Self::Storage { message: inner.to_string() },
			grove_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			grove_storage::Error::Qdrant(inner) => Self::Qdrant { message: inner.to_string() },
		}
	}
}

impl From<color_eyre::Report> for Error {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
