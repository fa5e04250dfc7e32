pub mod create_clusters;
pub mod quasi_clique;
pub mod similarity_graph;
