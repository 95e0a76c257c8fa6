pub mod frames;
pub mod search;
pub mod system;
