pub mod generator;

pub use generator::PlaylistGenerator;
