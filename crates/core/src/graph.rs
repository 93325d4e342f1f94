use crate::chunking::make_edge_id;
use crate::error::EmbeddingError;
use crate::models::{Edge, Node, SIMILARITY_EDGE_TYPE};
use crate::similarity::{top_k_neighbors, EmbeddingArena};

/// Turns one file's nodes into directed kNN edges weighted by cosine similarity.
#[derive(Debug, Clone, Copy)]
pub struct GraphBuilder {
    pub neighbors_k: usize,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self {
            neighbors_k: crate::config::DEFAULT_NEIGHBORS_K,
        }
    }
}

impl GraphBuilder {
    pub fn new(neighbors_k: usize) -> Self {
        Self { neighbors_k }
    }

    /// Emits at most `neighbors_k` outgoing edges per node, strongest first, never a self-loop.
    ///
    /// `nodes` must all belong to one file and be in ingestion order; that order breaks ties.
    pub fn build_edges(&self, nodes: &[Node]) -> Result<Vec<Edge>, EmbeddingError> {
        let Some(first) = nodes.first() else {
            return Ok(Vec::new());
        };

        let mut arena = EmbeddingArena::with_capacity(first.embedding.len(), nodes.len());
        for node in nodes {
            arena.push(&node.embedding)?;
        }

        let edges = top_k_neighbors(&arena, self.neighbors_k)
            .into_iter()
            .enumerate()
            .flat_map(|(row, neighbors)| {
                let source = &nodes[row];
                neighbors.into_iter().map(move |neighbor| {
                    let target = &nodes[neighbor.index];
                    Edge {
                        id: make_edge_id(&source.id, &target.id),
                        file_id: source.file_id.clone(),
                        source_node_id: source.id.clone(),
                        target_node_id: target.id.clone(),
                        weight: neighbor.similarity,
                        edge_type: SIMILARITY_EDGE_TYPE.to_string(),
                    }
                })
            })
            .collect();

        Ok(edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{Embedder, HashEmbedder};
    use crate::models::{NodeMetadata, TEXT_NODE_TYPE};
    use crate::similarity::cosine_similarity;
    use std::collections::HashMap;

    fn nodes_for(texts: &[&str]) -> Vec<Node> {
        let embedder = HashEmbedder::new(64);
        texts
            .iter()
            .enumerate()
            .map(|(index, text)| Node {
                id: format!("n{index}"),
                file_id: "file-1".to_string(),
                node_type: TEXT_NODE_TYPE.to_string(),
                chunk_index: index,
                content: text.to_string(),
                embedding: embedder.embed(text).expect("hash embedder is infallible"),
                metadata: NodeMetadata::new(),
            })
            .collect()
    }

    #[test]
    fn single_node_has_no_edges() -> Result<(), EmbeddingError> {
        let edges = GraphBuilder::new(5).build_edges(&nodes_for(&["only"]))?;
        assert!(edges.is_empty());
        Ok(())
    }

    #[test]
    fn out_degree_is_bounded_and_sorted() -> Result<(), EmbeddingError> {
        let nodes = nodes_for(&["a", "b", "c", "d", "e", "f", "g"]);
        let edges = GraphBuilder::new(3).build_edges(&nodes)?;

        let mut by_source: HashMap<&str, Vec<&Edge>> = HashMap::new();
        for edge in &edges {
            assert_ne!(edge.source_node_id, edge.target_node_id);
            by_source.entry(edge.source_node_id.as_str()).or_default().push(edge);
        }

        assert_eq!(by_source.len(), nodes.len());
        for outgoing in by_source.values() {
            assert_eq!(outgoing.len(), 3);
            assert!(outgoing
                .windows(2)
                .all(|pair| pair[0].weight >= pair[1].weight));
        }
        Ok(())
    }

    #[test]
    fn three_nodes_yield_at_most_six_edges() -> Result<(), EmbeddingError> {
        let edges = GraphBuilder::new(5).build_edges(&nodes_for(&["x", "y", "z"]))?;
        assert_eq!(edges.len(), 6);
        Ok(())
    }

    #[test]
    fn weight_is_cosine_of_endpoints() -> Result<(), EmbeddingError> {
        let nodes = nodes_for(&["pump", "valve", "pipe"]);
        let edges = GraphBuilder::new(2).build_edges(&nodes)?;
        let lookup: HashMap<_, _> = nodes.iter().map(|node| (node.id.as_str(), node)).collect();

        for edge in edges {
            let expected = cosine_similarity(
                &lookup[edge.source_node_id.as_str()].embedding,
                &lookup[edge.target_node_id.as_str()].embedding,
            );
            assert!((edge.weight - expected).abs() < 1e-5);
            assert_eq!(edge.file_id, "file-1");
            assert_eq!(edge.edge_type, SIMILARITY_EDGE_TYPE);
        }
        Ok(())
    }

    #[test]
    fn mixed_dimensions_are_rejected() {
        let mut nodes = nodes_for(&["a", "b"]);
        nodes[1].embedding.pop();
        assert!(GraphBuilder::new(1).build_edges(&nodes).is_err());
    }
}
