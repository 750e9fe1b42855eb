pub mod ray_hit_collectors;
