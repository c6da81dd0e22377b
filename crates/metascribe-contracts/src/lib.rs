pub mod events;
pub mod markers;
pub mod settings;
pub mod tone;
