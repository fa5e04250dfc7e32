pub mod normalize;
pub mod similarity;
pub mod single_target;
