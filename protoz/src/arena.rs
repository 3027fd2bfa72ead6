//! Arena manager: owned storage regions and lifetime fusion.
//!
//! Every [`Arena`] handle owns one append-only region. Arenas are grouped
//! into fuse groups; a group owns the regions of all its member arenas and
//! lives as long as any member handle does. Fusing two arenas merges their
//! groups, so storage reachable from either side stays alive until the last
//! handle of the merged group is dropped.
//!
//! ```text
//!  Arena A ──┐                 ┌── Region A
//!            ├──▶ FuseGroup ───┤
//!  Arena B ──┘   (+ identity)  └── Region B
//! ```

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use crate::identity::IdentityCache;
use crate::message::MessageInner;
use crate::storage::{Addr, ArrayData, Block, MapData, MessageData};

static NEXT_REGION: AtomicU64 = AtomicU64::new(1);

struct Region {
    id: u64,
    blocks: RefCell<Vec<Rc<RefCell<Block>>>>,
}

impl Region {
    fn new() -> Self {
        Self {
            id: NEXT_REGION.fetch_add(1, Ordering::Relaxed),
            blocks: RefCell::new(Vec::new()),
        }
    }

    fn alloc(&self, block: Block) -> Addr {
        let mut blocks = self.blocks.borrow_mut();
        let Ok(slot) = u32::try_from(blocks.len()) else {
            panic!("arena region {} exhausted", self.id);
        };
        blocks.push(Rc::new(RefCell::new(block)));
        Addr {
            region: self.id,
            slot,
        }
    }
}

/// Shared ownership of a set of fused regions.
pub(crate) struct FuseGroup {
    regions: RefCell<HashMap<u64, Rc<Region>>>,
    members: RefCell<Vec<Weak<ArenaState>>>,
    pub(crate) identity: IdentityCache<MessageInner>,
}

impl FuseGroup {
    fn new(region: Rc<Region>) -> Self {
        Self {
            regions: RefCell::new(HashMap::from([(region.id, region)])),
            members: RefCell::new(Vec::new()),
            identity: IdentityCache::new(),
        }
    }

    fn region_count(&self) -> usize {
        self.regions.borrow().len()
    }
}

impl Drop for FuseGroup {
    fn drop(&mut self) {
        let regions = self.regions.get_mut().len();
        if regions > 0 {
            debug!("[ARENA] Releasing fuse group with {} region(s)", regions);
        }
        self.identity.clear();
    }
}

struct ArenaState {
    region: Rc<Region>,
    group: RefCell<Rc<FuseGroup>>,
}

/// Reference-counted handle to an arena.
///
/// Cloning the handle shares the same arena. Wrapper objects and collection
/// views hold one, which is what keeps their storage alive.
#[derive(Clone)]
pub struct Arena {
    state: Rc<ArenaState>,
}

impl Arena {
    pub fn new() -> Self {
        let region = Rc::new(Region::new());
        let group = Rc::new(FuseGroup::new(Rc::clone(&region)));
        let state = Rc::new(ArenaState {
            region,
            group: RefCell::new(Rc::clone(&group)),
        });
        group.members.borrow_mut().push(Rc::downgrade(&state));
        trace!("[ARENA] New arena {}", state.region.id);
        Self { state }
    }

    pub fn id(&self) -> u64 {
        self.state.region.id
    }

    pub(crate) fn group(&self) -> Rc<FuseGroup> {
        Rc::clone(&self.state.group.borrow())
    }

    /// Merge the lifetimes of two arenas.
    ///
    /// Commutative and idempotent. Afterwards, storage of either arena is
    /// reachable through both and released only when every handle of the
    /// merged group is gone.
    pub fn fuse(&self, other: &Arena) {
        let a = self.group();
        let b = other.group();
        if Rc::ptr_eq(&a, &b) {
            return;
        }

        let (keep, absorb) = if a.region_count() >= b.region_count() {
            (a, b)
        } else {
            (b, a)
        };

        let regions: Vec<_> = absorb.regions.borrow_mut().drain().collect();
        keep.regions.borrow_mut().extend(regions);
        keep.identity.absorb(&absorb.identity);

        let members = std::mem::take(&mut *absorb.members.borrow_mut());
        let mut kept = keep.members.borrow_mut();
        kept.retain(|weak| weak.strong_count() > 0);
        for weak in members {
            if let Some(state) = weak.upgrade() {
                *state.group.borrow_mut() = Rc::clone(&keep);
                kept.push(weak);
            }
        }

        debug!(
            "[ARENA] Fused arenas {} and {} ({} regions)",
            self.id(),
            other.id(),
            keep.region_count()
        );
    }

    pub fn is_fused_with(&self, other: &Arena) -> bool {
        Rc::ptr_eq(&self.group(), &other.group())
    }

    /// Number of regions kept alive by this arena's fuse group.
    pub fn region_count(&self) -> usize {
        self.group().region_count()
    }

    /// Number of live message wrappers bound to this arena's fuse group.
    pub fn live_wrappers(&self) -> usize {
        self.group().identity.live_count()
    }

    /// Release this handle. Memory goes away once no other handle of the
    /// fuse group remains.
    pub fn free(self) {
        trace!(
            "[ARENA] Freeing handle to arena {} ({} other handle(s))",
            self.id(),
            Rc::strong_count(&self.state) - 1
        );
    }

    pub(crate) fn alloc(&self, block: Block) -> Addr {
        self.state.region.alloc(block)
    }

    pub(crate) fn alloc_message(&self, data: MessageData) -> Addr {
        self.alloc(Block::Message(data))
    }

    /// Resolve an address inside this arena's fuse group.
    ///
    /// An address outside the group means a store skipped its fuse step;
    /// that is unrecoverable.
    pub(crate) fn block(&self, addr: Addr) -> Rc<RefCell<Block>> {
        let group = self.group();
        let regions = group.regions.borrow();
        let block = regions
            .get(&addr.region)
            .and_then(|region| region.blocks.borrow().get(addr.slot as usize).cloned());
        match block {
            Some(block) => block,
            None => panic!("address {addr} is not owned by arena {}", self.id()),
        }
    }

    pub(crate) fn with_message<R>(&self, addr: Addr, f: impl FnOnce(&MessageData) -> R) -> R {
        let block = self.block(addr);
        let guard = block.borrow();
        f(message_ref(&guard, addr))
    }

    pub(crate) fn with_message_mut<R>(
        &self,
        addr: Addr,
        f: impl FnOnce(&mut MessageData) -> R,
    ) -> R {
        let block = self.block(addr);
        let mut guard = block.borrow_mut();
        f(message_mut(&mut guard, addr))
    }

    pub(crate) fn with_array<R>(&self, addr: Addr, f: impl FnOnce(&ArrayData) -> R) -> R {
        let block = self.block(addr);
        let guard = block.borrow();
        match &*guard {
            Block::Array(data) => f(data),
            other => panic!("expected array at {addr}, found {}", other.kind()),
        }
    }

    pub(crate) fn with_array_mut<R>(&self, addr: Addr, f: impl FnOnce(&mut ArrayData) -> R) -> R {
        let block = self.block(addr);
        let mut guard = block.borrow_mut();
        match &mut *guard {
            Block::Array(data) => f(data),
            other => panic!("expected array at {addr}, found {}", other.kind()),
        }
    }

    pub(crate) fn with_map<R>(&self, addr: Addr, f: impl FnOnce(&MapData) -> R) -> R {
        let block = self.block(addr);
        let guard = block.borrow();
        match &*guard {
            Block::Map(data) => f(data),
            other => panic!("expected map at {addr}, found {}", other.kind()),
        }
    }

    pub(crate) fn with_map_mut<R>(&self, addr: Addr, f: impl FnOnce(&mut MapData) -> R) -> R {
        let block = self.block(addr);
        let mut guard = block.borrow_mut();
        match &mut *guard {
            Block::Map(data) => f(data),
            other => panic!("expected map at {addr}, found {}", other.kind()),
        }
    }
}

pub(crate) fn message_ref<'a>(guard: &'a Ref<'_, Block>, addr: Addr) -> &'a MessageData {
    match &**guard {
        Block::Message(data) => data,
        other => panic!("expected message at {addr}, found {}", other.kind()),
    }
}

fn message_mut<'a>(guard: &'a mut RefMut<'_, Block>, addr: Addr) -> &'a mut MessageData {
    match &mut **guard {
        Block::Message(data) => data,
        other => panic!("expected message at {addr}, found {}", other.kind()),
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("id", &self.id())
            .field("regions", &self.region_count())
            .finish()
    }
}
