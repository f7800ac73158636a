//! Orthant tree (octree for D = 3) used for Barnes-Hut force evaluation.
//!
//! Nodes live in an arena and address their children by index, so a rebuild
//! reuses the allocation instead of churning one box per node every step. The
//! tree stores body indices, never references into body storage; leaf nodes
//! cache the occupant's position and mass as their aggregate, which keeps the
//! force traversal a pure read of the arena.

use nalgebra::{SVector, SimdComplexField};

use crate::shared::{Bounds, Float, Particle, SimulationSettings};

pub struct OrthNode<F: Float, const D: usize> {
    pub bounds: Bounds<F, D>,
    /// Mass-weighted centroid of everything beneath this node. For a leaf this
    /// is the occupant's position.
    pub center_of_mass: SVector<F, D>,
    /// Aggregate mass of everything beneath this node; 0 marks an empty leaf.
    pub mass: F,
    occupant: Option<usize>,
    // Index of the first of 2^D contiguous children; None for a leaf.
    // TODO: use an array with size 2^D after const_generics stabilizes #![feature(const_generics)]
    first_child: Option<usize>,
}

impl<F: Float, const D: usize> OrthNode<F, D> {
    fn new(bounds: Bounds<F, D>) -> Self {
        Self {
            bounds,
            center_of_mass: SVector::<F, D>::zeros(),
            mass: F::from(0.0).unwrap(),
            occupant: None,
            first_child: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.first_child.is_none()
    }

    /// Body index stored in this leaf, if any. With the depth cutoff in play a
    /// leaf may aggregate several coincident bodies; the index is the first.
    pub fn occupant(&self) -> Option<usize> {
        self.occupant
    }
}

pub struct OrthTree<F: Float, const D: usize> {
    nodes: Vec<OrthNode<F, D>>,
    root: Option<usize>,
    max_depth: usize,
}

impl<F: Float, const D: usize> OrthTree<F, D> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            max_depth: 0,
        }
    }

    /// Replace the previous tree with one sized to exactly bound the current
    /// positions. An empty input leaves the tree empty and all force queries
    /// against it are no-ops.
    pub fn build<P: Particle<F, D>>(&mut self, points: &[P], max_depth: usize) {
        self.nodes.clear();
        self.root = None;
        self.max_depth = max_depth;
        if points.is_empty() {
            return;
        }

        self.nodes.push(OrthNode::new(Bounds::enclosing(points)));
        self.root = Some(0);
        for (index, point) in points.iter().enumerate() {
            self.insert(0, index, *point.position(), point.get_mass(), 0);
        }
    }

    fn insert(
        &mut self,
        node_index: usize,
        point_index: usize,
        position: SVector<F, D>,
        mass: F,
        depth: usize,
    ) {
        let first_child = if let Some(first_child) = self.nodes[node_index].first_child {
            first_child
        } else {
            match self.nodes[node_index].occupant {
                None => {
                    // Empty leaf: the body settles here.
                    let node = &mut self.nodes[node_index];
                    node.occupant = Some(point_index);
                    node.center_of_mass = position;
                    node.mass = mass;
                    return;
                }
                Some(occupant) => {
                    if depth >= self.max_depth {
                        // (Near-)coincident bodies would subdivide forever;
                        // coalesce into this leaf's aggregate instead.
                        let node = &mut self.nodes[node_index];
                        let total = node.mass + mass;
                        node.center_of_mass =
                            (node.center_of_mass * node.mass + position * mass) / total;
                        node.mass = total;
                        return;
                    }
                    // Occupied leaf: split into 2^D children and push the
                    // occupant one level down. The node keeps the occupant's
                    // mass/center as its aggregate; the new body is merged in
                    // below, after its own descent.
                    let occupant_position = self.nodes[node_index].center_of_mass;
                    let occupant_mass = self.nodes[node_index].mass;
                    self.nodes[node_index].occupant = None;
                    let first_child = self.subdivide(node_index);
                    let orthant = self.nodes[node_index].bounds.get_orthant(&occupant_position);
                    self.insert(
                        first_child + orthant,
                        occupant,
                        occupant_position,
                        occupant_mass,
                        depth + 1,
                    );
                    first_child
                }
            }
        };

        // Internal node: descend into the matching orthant, then fold the new
        // body into this node's aggregate with a mass-weighted merge.
        let orthant = self.nodes[node_index].bounds.get_orthant(&position);
        self.insert(first_child + orthant, point_index, position, mass, depth + 1);

        let node = &mut self.nodes[node_index];
        let total = node.mass + mass;
        node.center_of_mass = (node.center_of_mass * node.mass + position * mass) / total;
        node.mass = total;
    }

    /// Push 2^D empty children covering the orthants of `node_index` and
    /// return the index of the first.
    fn subdivide(&mut self, node_index: usize) -> usize {
        let first_child = self.nodes.len();
        let bounds = self.nodes[node_index].bounds;
        for orthant in 0..1 << D {
            self.nodes.push(OrthNode::new(bounds.create_orthant(orthant)));
        }
        self.nodes[node_index].first_child = Some(first_child);
        first_child
    }

    /// Approximate net gravitational force on `point` from every other body in
    /// the tree. Pure read: concurrent calls against the same tree are safe.
    pub fn force_on<P: Particle<F, D>>(
        &self,
        point: &P,
        settings: &SimulationSettings<F>,
    ) -> SVector<F, D> {
        match self.root {
            Some(root) => self.accumulate(root, point.position(), point.get_mass(), settings),
            None => SVector::<F, D>::zeros(),
        }
    }

    fn accumulate(
        &self,
        node_index: usize,
        position: &SVector<F, D>,
        mass: F,
        settings: &SimulationSettings<F>,
    ) -> SVector<F, D> {
        let node = &self.nodes[node_index];
        if node.mass == F::from(0.0).unwrap() {
            // empty leaf
            return SVector::<F, D>::zeros();
        }

        let r = node.center_of_mass - position;
        let d2 = r.norm_squared();
        let d = SimdComplexField::simd_sqrt(d2);
        if d <= settings.softening {
            // Inside the softening floor; this also covers a body meeting the
            // leaf it occupies itself.
            return SVector::<F, D>::zeros();
        }

        match node.first_child {
            // Too close to approximate: sum the children.
            Some(first_child) if node.bounds.half_width >= settings.theta * d => (0..1 << D)
                .map(|orthant| self.accumulate(first_child + orthant, position, mass, settings))
                .fold(SVector::<F, D>::zeros(), |acc, f| acc + f),
            // Leaf, or admissible under the opening angle: one point mass.
            _ => {
                let magnitude = settings.g * mass * node.mass / d2;
                r * (magnitude / d)
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn root(&self) -> Option<&OrthNode<F, D>> {
        self.root.map(|index| &self.nodes[index])
    }
}

impl<F: Float, const D: usize> Default for OrthTree<F, D> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::PointBody;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    type Body3 = PointBody<f64, 3>;

    fn random_cluster(n: usize, seed: u64) -> Vec<Body3> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                Body3::new(
                    [
                        rng.random_range(-1.0..1.0),
                        rng.random_range(-1.0..1.0),
                        rng.random_range(-1.0..1.0),
                    ]
                    .into(),
                    SVector::zeros(),
                    rng.random_range(0.1..2.0),
                    0.0,
                )
            })
            .collect()
    }

    fn built(points: &[Body3]) -> OrthTree<f64, 3> {
        let mut tree = OrthTree::new();
        tree.build(points, 32);
        tree
    }

    #[test]
    fn empty_build_leaves_tree_empty() {
        let tree = built(&[]);
        assert!(tree.is_empty());
        assert_eq!(tree.node_count(), 0);
        let probe = Body3::new([1.0, 2.0, 3.0].into(), SVector::zeros(), 1.0, 0.0);
        let force = tree.force_on(&probe, &SimulationSettings::default());
        assert_eq!(force, SVector::<f64, 3>::zeros());
    }

    #[test]
    fn every_body_lands_in_exactly_one_leaf() {
        let points = random_cluster(200, 7);
        let tree = built(&points);

        let mut seen = vec![0usize; points.len()];
        for node in &tree.nodes {
            if let Some(index) = node.occupant {
                assert!(node.is_leaf());
                seen[index] += 1;
            }
        }
        assert!(seen.iter().all(|&count| count == 1));
    }

    #[test]
    fn aggregates_match_children() {
        let points = random_cluster(150, 11);
        let tree = built(&points);

        let total: f64 = points.iter().map(|p| p.mass).sum();
        let root = tree.root().unwrap();
        assert!((root.mass - total).abs() < 1e-9 * total);

        for node in &tree.nodes {
            let Some(first_child) = node.first_child else {
                continue;
            };
            let child_mass: f64 = (0..8).map(|o| tree.nodes[first_child + o].mass).sum();
            let child_weighted = (0..8)
                .map(|o| {
                    let child = &tree.nodes[first_child + o];
                    child.center_of_mass * child.mass
                })
                .fold(SVector::<f64, 3>::zeros(), |acc, c| acc + c);
            assert!((node.mass - child_mass).abs() < 1e-9 * node.mass);
            let diff = node.center_of_mass - child_weighted / child_mass;
            assert!(diff.norm() < 1e-9);
        }
    }

    #[test]
    fn rebuild_with_same_input_is_identical() {
        let points = random_cluster(100, 3);
        let mut tree = OrthTree::new();
        tree.build(&points, 32);
        let before: Vec<(f64, SVector<f64, 3>)> = tree
            .nodes
            .iter()
            .map(|n| (n.mass, n.center_of_mass))
            .collect();

        tree.build(&points, 32);
        let after: Vec<(f64, SVector<f64, 3>)> = tree
            .nodes
            .iter()
            .map(|n| (n.mass, n.center_of_mass))
            .collect();

        assert_eq!(before, after);
    }

    #[test]
    fn coincident_bodies_coalesce_at_depth_cutoff() {
        let position: SVector<f64, 3> = [1.0, 1.0, 1.0].into();
        let points = vec![
            Body3::new(position, SVector::zeros(), 2.0, 0.0),
            Body3::new(position, SVector::zeros(), 3.0, 0.0),
            Body3::new([-1.0, 0.0, 0.0].into(), SVector::zeros(), 1.0, 0.0),
        ];
        let mut tree = OrthTree::new();
        tree.build(&points, 8);

        let root = tree.root().unwrap();
        assert!((root.mass - 6.0).abs() < 1e-12);
        // the two coincident bodies share one coalesced leaf
        let coalesced = tree
            .nodes
            .iter()
            .find(|n| n.is_leaf() && (n.mass - 5.0).abs() < 1e-12)
            .unwrap();
        assert_eq!(coalesced.center_of_mass, position);
    }

    #[test]
    fn single_body_tree_exerts_no_force_on_its_occupant() {
        let points = vec![Body3::new(
            [2.0, -1.0, 0.5].into(),
            SVector::zeros(),
            5.0,
            0.0,
        )];
        let tree = built(&points);
        let force = tree.force_on(&points[0], &SimulationSettings::default());
        assert_eq!(force, SVector::<f64, 3>::zeros());
    }
}
