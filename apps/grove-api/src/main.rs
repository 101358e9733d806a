use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = grove_api::Args::parse();

	grove_api::run(args).await
}
