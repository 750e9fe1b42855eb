pub mod coarse_min_max;
pub mod height_field_ray_cast;
