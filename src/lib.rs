pub mod barnes_hut;
pub mod brute_force;
pub mod octree;
pub mod shared;
