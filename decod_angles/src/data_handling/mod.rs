pub mod decod;
pub mod events;
