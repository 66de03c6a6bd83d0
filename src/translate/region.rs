//! Region memory model
//!
//! Memory is split into disjoint regions, each backed by one map variable
//! `$M.<id>` in the generated program. Which region an access belongs to is
//! decided by an injected [`AliasOracle`]; this module only numbers the
//! partitions it reports and accumulates what is stored in them.
//!
//! # Lifecycle
//!
//! 1. A collection pass visits every access site in source order. The first
//!    site that reports an unseen partition creates a region, so ids are dense
//!    and follow first touch.
//! 2. Each access records its element type and size. A region that sees two
//!    different sizes becomes byte-granular: its map stores single bytes and
//!    wider accesses are reassembled.
//! 3. Translation queries the same sites again and gets the same ids.

use crate::ir::{DataLayout, Type};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Dense region id
pub type RegionId = usize;

/// Byte widths an access can be split into when lowering block operations
pub const MEMORY_ACCESS_SIZES: [u64; 4] = [1, 2, 4, 8];

/// Name of the map variable backing a region
pub fn region_var(id: RegionId) -> String {
    format!("$M.{}", id)
}

/// Partition label reported by an oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Partition(pub u64);

/// A memory access site: the pointer operand of a load, store or block operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessSite<'a> {
    /// Enclosing function for local pointers, `None` for globals
    pub function: Option<&'a str>,
    pub pointer: &'a str,
    /// Constant byte offset from the pointer, used by static initializers
    pub offset: u64,
}

impl<'a> AccessSite<'a> {
    pub fn local(function: &'a str, pointer: &'a str) -> Self {
        Self {
            function: Some(function),
            pointer,
            offset: 0,
        }
    }

    pub fn global(pointer: &'a str, offset: u64) -> Self {
        Self {
            function: None,
            pointer,
            offset,
        }
    }

    /// Key used by [`AliasClasses`]: `function::pointer` or `pointer`
    pub fn key(&self) -> String {
        match self.function {
            Some(f) => format!("{}::{}", f, self.pointer),
            None => self.pointer.to_string(),
        }
    }
}

impl fmt::Display for AccessSite<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())?;
        if self.offset != 0 {
            write!(f, "+{}", self.offset)?;
        }
        Ok(())
    }
}

/// Capability answering which partition an access site belongs to
pub trait AliasOracle {
    /// `None` means the oracle knows nothing about the site
    fn partition(&self, site: &AccessSite<'_>) -> Option<Partition>;

    /// Whether the partition holds memory owned outside the unit
    fn is_external(&self, _partition: Partition) -> bool {
        false
    }
}

/// Every site in one partition
#[derive(Debug, Default, Clone, Copy)]
pub struct UnifiedOracle;

impl AliasOracle for UnifiedOracle {
    fn partition(&self, _site: &AccessSite<'_>) -> Option<Partition> {
        Some(Partition(0))
    }
}

/// Union-find over pointer names
///
/// Partitions are numbered by the insertion index of the class representative,
/// which keeps them deterministic across runs.
#[derive(Debug, Default, Clone)]
pub struct AliasClasses {
    index: HashMap<String, usize>,
    parent: Vec<usize>,
    external: BTreeSet<usize>,
}

impl AliasClasses {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, key: &str) -> usize {
        if let Some(&i) = self.index.get(key) {
            return i;
        }
        let i = self.parent.len();
        self.parent.push(i);
        self.index.insert(key.to_string(), i);
        i
    }

    fn find(&self, mut i: usize) -> usize {
        while self.parent[i] != i {
            i = self.parent[i];
        }
        i
    }

    /// Register a pointer in its own class
    pub fn add(mut self, key: &str) -> Self {
        self.slot(key);
        self
    }

    /// Merge the classes of `a` and `b`
    pub fn alias(mut self, a: &str, b: &str) -> Self {
        let ra = {
            let i = self.slot(a);
            self.find(i)
        };
        let rb = {
            let i = self.slot(b);
            self.find(i)
        };
        if ra != rb {
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = root;
            if self.external.remove(&child) {
                self.external.insert(root);
            }
        }
        self
    }

    /// Mark the class of `key` as external memory
    pub fn external(mut self, key: &str) -> Self {
        let i = self.slot(key);
        let root = self.find(i);
        self.external.insert(root);
        self
    }
}

impl AliasOracle for AliasClasses {
    fn partition(&self, site: &AccessSite<'_>) -> Option<Partition> {
        let i = *self.index.get(&site.key())?;
        Some(Partition(self.find(i) as u64))
    }

    fn is_external(&self, partition: Partition) -> bool {
        self.external.contains(&(partition.0 as usize))
    }
}

/// What a region holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// Single bytes
    Bytes,
    Pointer,
    Float,
    /// Integers of the given byte size
    Integer(u64),
}

/// A disjoint memory partition
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub id: RegionId,
    pub partition: Partition,
    /// Distinct element types seen, in first-seen order
    pub types: Vec<Type>,
    /// Distinct access sizes seen
    pub sizes: BTreeSet<u64>,
    /// Accessed at more than one width
    pub bytewise: bool,
    pub external: bool,
}

impl Region {
    fn new(id: RegionId, partition: Partition, external: bool) -> Self {
        Self {
            id,
            partition,
            types: vec![],
            sizes: BTreeSet::new(),
            bytewise: false,
            external,
        }
    }

    /// Width in bytes of one map cell
    pub fn element_size(&self) -> u64 {
        if self.bytewise {
            return 1;
        }
        self.sizes.iter().next().copied().unwrap_or(1)
    }

    pub fn element_kind(&self) -> ElementKind {
        if self.bytewise || self.types.is_empty() {
            return ElementKind::Bytes;
        }
        if self.types.iter().all(Type::is_pointer) {
            ElementKind::Pointer
        } else if self.types.iter().all(Type::is_float) && self.types.windows(2).all(|w| w[0] == w[1]) {
            ElementKind::Float
        } else {
            ElementKind::Integer(self.element_size())
        }
    }

    pub fn var(&self) -> String {
        region_var(self.id)
    }
}

/// Region table for one translation unit
pub struct RegionModel {
    oracle: Box<dyn AliasOracle>,
    regions: Vec<Region>,
    by_partition: HashMap<Partition, RegionId>,
}

impl fmt::Debug for RegionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionModel").field("regions", &self.regions).finish()
    }
}

impl RegionModel {
    pub fn new(oracle: Box<dyn AliasOracle>) -> Self {
        Self {
            oracle,
            regions: vec![],
            by_partition: HashMap::new(),
        }
    }

    /// Region of an access site, created on first touch
    pub fn region_of(&mut self, site: &AccessSite<'_>) -> Result<RegionId> {
        let partition = self
            .oracle
            .partition(site)
            .ok_or_else(|| Error::RegionOracleFailure { site: site.to_string() })?;
        if let Some(&id) = self.by_partition.get(&partition) {
            return Ok(id);
        }
        let id = self.regions.len();
        let external = self.oracle.is_external(partition);
        self.regions.push(Region::new(id, partition, external));
        self.by_partition.insert(partition, id);
        tracing::trace!(id, partition = partition.0, "new region");
        Ok(id)
    }

    /// Accumulate an element type and access size
    pub fn record_access(&mut self, id: RegionId, ty: &Type, size: u64) {
        let Some(region) = self.regions.get_mut(id) else {
            return;
        };
        if !region.types.contains(ty) {
            region.types.push(ty.clone());
        }
        if !region.sizes.is_empty() && !region.sizes.contains(&size) {
            region.bytewise = true;
        }
        region.sizes.insert(size);
    }

    /// Record a typed access, computing its size from the layout
    pub fn record_typed(&mut self, id: RegionId, ty: &Type, layout: &dyn DataLayout) -> Result<u64> {
        let size = layout.store_size(ty)?;
        self.record_access(id, ty, size);
        Ok(size)
    }

    pub fn all_regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
