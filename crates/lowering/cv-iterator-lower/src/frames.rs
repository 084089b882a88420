//! Finally-frame tree
//!
//! Every try statement that contains a suspension point becomes a frame. The
//! root frame stands for the method body itself. Frames remember which states
//! can be active beneath them, so disposal can run exactly the finally
//! handlers that enclose the suspended state.

use cv_bound::{LabelId, SynthMethodId};
use indexmap::IndexMap;
use la_arena::{Arena, Idx};
use rustc_hash::FxHashSet;
use std::mem;

use crate::RUNNING_STATE;

pub(crate) type FrameId = Idx<Frame>;

#[derive(Debug)]
pub(crate) struct Frame {
    pub(crate) parent: Option<FrameId>,
    /// State the machine is in while executing directly inside this frame
    pub(crate) finalize_state: i32,
    /// Synthesized finally handler; the root has none
    pub(crate) handler: Option<SynthMethodId>,
    /// State -> child frame on the path to the frame that registered it
    pub(crate) known_states: IndexMap<i32, FrameId>,
    /// Jump target outside the frame -> label that runs the handler first
    pub(crate) proxy_labels: IndexMap<LabelId, LabelId>,
    /// Labels defined inside the frame's try statement
    pub(crate) defined_labels: FxHashSet<LabelId>,
}

/// Arena of frames plus the root
#[derive(Debug)]
pub(crate) struct FrameTree {
    frames: Arena<Frame>,
    root: FrameId,
}

impl FrameTree {
    pub(crate) fn new() -> Self {
        let mut frames = Arena::new();
        let root = frames.alloc(Frame {
            parent: None,
            finalize_state: RUNNING_STATE,
            handler: None,
            known_states: IndexMap::new(),
            proxy_labels: IndexMap::new(),
            defined_labels: FxHashSet::default(),
        });
        Self { frames, root }
    }

    pub(crate) fn root(&self) -> FrameId {
        self.root
    }

    /// Adds a child frame and registers its finalize state with its ancestors
    pub(crate) fn push(
        &mut self,
        parent: FrameId,
        finalize_state: i32,
        handler: SynthMethodId,
        defined_labels: FxHashSet<LabelId>,
    ) -> FrameId {
        let frame = self.frames.alloc(Frame {
            parent: Some(parent),
            finalize_state,
            handler: Some(handler),
            known_states: IndexMap::new(),
            proxy_labels: IndexMap::new(),
            defined_labels,
        });
        self.add_state(frame, finalize_state);
        frame
    }

    /// Registers `state` as reachable beneath `frame`
    pub(crate) fn add_state(&mut self, frame: FrameId, state: i32) {
        let mut child = frame;
        while let Some(parent) = self.frames[child].parent {
            self.frames[parent].known_states.insert(state, child);
            child = parent;
        }
    }

    /// Returns the label a jump from inside `frame` to `target` must use
    ///
    /// Jumps that stay inside the frame, and every jump at the root, go
    /// straight to their target. Others get one proxy label per target.
    pub(crate) fn proxy_if_needed(
        &mut self,
        frame: FrameId,
        target: LabelId,
        fresh_label: impl FnOnce() -> LabelId,
    ) -> LabelId {
        let frame = &mut self.frames[frame];
        if frame.parent.is_none() || frame.defined_labels.contains(&target) {
            return target;
        }
        *frame.proxy_labels.entry(target).or_insert_with(fresh_label)
    }

    pub(crate) fn take_proxies(&mut self, frame: FrameId) -> IndexMap<LabelId, LabelId> {
        mem::take(&mut self.frames[frame].proxy_labels)
    }

    /// Child frames with the states they cover, in first-registration order
    pub(crate) fn children_by_state(&self, frame: FrameId) -> IndexMap<FrameId, Vec<i32>> {
        let mut grouped: IndexMap<FrameId, Vec<i32>> = IndexMap::new();
        for (&state, &child) in &self.frames[frame].known_states {
            grouped.entry(child).or_default().push(state);
        }
        grouped
    }

    pub(crate) fn get(&self, frame: FrameId) -> &Frame {
        &self.frames[frame]
    }
}
