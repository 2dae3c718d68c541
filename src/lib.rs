pub mod chi_square;
pub mod core;
pub mod distributions;
pub mod error;
pub mod feature_matrix;
pub mod io;
pub mod math;
pub mod models;
pub mod updates;
