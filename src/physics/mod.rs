pub mod collidables;
pub mod collision_detection;
pub mod height_field_description;
pub mod trees;
