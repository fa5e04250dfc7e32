pub mod candidate_generation;
