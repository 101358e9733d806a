pub mod evidence;
pub mod mentions;
