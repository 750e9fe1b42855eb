pub mod shape;
pub mod ray;

// Height field primitives
pub mod triangle;
pub mod height_field;
