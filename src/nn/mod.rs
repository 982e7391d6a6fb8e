mod dropout3d;

pub use dropout3d::*;
