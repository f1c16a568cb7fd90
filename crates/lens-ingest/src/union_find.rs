//! Disjoint-set forest over an arena of indices

/// Union–find with path compression.
///
/// Elements are dense indices `0..len`; callers map their own ids onto them.
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    /// Create `len` singleton sets
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Root of `x`'s set. Every node visited is re-pointed at its grandparent
    /// (path halving), so repeated finds flatten the tree.
    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Merge the sets of `a` and `b`; the root of `b` is attached under the
    /// root of `a`. Returns false if they were already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return false;
        }
        self.parent[root_b] = root_a;
        true
    }

    /// All sets, each as ascending member indices, ordered by smallest member
    pub fn components(&mut self) -> Vec<Vec<usize>> {
        let mut by_root: Vec<Vec<usize>> = vec![Vec::new(); self.len()];
        for x in 0..self.len() {
            let root = self.find(x);
            by_root[root].push(x);
        }
        let mut components: Vec<Vec<usize>> =
            by_root.into_iter().filter(|members| !members.is_empty()).collect();
        components.sort_by_key(|members| members[0]);
        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singletons() {
        let mut set = DisjointSet::new(3);
        assert_eq!(set.components(), vec![vec![0], vec![1], vec![2]]);
        assert!(DisjointSet::new(0).is_empty());
    }

    #[test]
    fn test_union_and_find() {
        let mut set = DisjointSet::new(6);
        assert!(set.union(0, 1));
        assert!(set.union(1, 2));
        assert!(set.union(3, 4));
        assert!(!set.union(2, 0));

        assert_eq!(set.find(2), set.find(0));
        assert_eq!(set.find(4), set.find(3));
        assert_ne!(set.find(0), set.find(3));
        assert_eq!(set.find(5), 5);

        assert_eq!(set.components(), vec![vec![0, 1, 2], vec![3, 4], vec![5]]);
    }

    #[test]
    fn test_second_root_attaches_under_first() {
        let mut set = DisjointSet::new(2);
        set.union(1, 0);
        assert_eq!(set.find(0), 1);
    }

    #[test]
    fn test_path_compression_flattens_chain() {
        let mut set = DisjointSet::new(5);
        // Build a chain 4 -> 3 -> 2 -> 1 -> 0
        for i in (1..5).rev() {
            set.union(i - 1, i);
        }
        let root = set.find(4);
        assert_eq!(root, 0);
        // A second find walks a shorter path
        let depth_after = {
            let mut x = 4;
            let mut depth = 0;
            while set.parent[x] != x {
                x = set.parent[x];
                depth += 1;
            }
            depth
        };
        assert!(depth_after <= 2);
    }
}
