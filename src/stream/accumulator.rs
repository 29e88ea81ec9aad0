//! Reassembly of fragmented tool calls.
//!
//! The gateway splits each tool call across many delta frames: the first
//! fragment for a call carries its id and function name, later fragments
//! carry an empty id and an arguments substring. Fragments are folded into
//! per-call slots keyed by id; an empty-id fragment extends the most
//! recently started call.

use tracing::warn;

use crate::protocol::{FunctionCall, ToolCall, ToolCallFragment};

/// How a fragment relates to the calls assembled so far.
#[derive(Debug, PartialEq, Eq)]
enum FragmentKind {
    /// Carries an id: starts a call or extends the call with that id.
    HasId,
    /// Empty id with at least one call already started: continuation.
    Continuation,
    /// Empty id before any call exists. Nothing to attach to.
    Orphan,
}

/// Accumulates tool-call fragments into complete calls.
///
/// Calls are kept in the order their first fragment arrived.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: Vec<ToolCall>,
}

impl ToolCallAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Fold one fragment into the accumulated state.
    pub fn apply(&mut self, fragment: &ToolCallFragment) {
        match self.classify(fragment) {
            FragmentKind::HasId => {
                let id = fragment.id_str();
                match self.calls.iter_mut().find(|call| call.id == id) {
                    Some(call) => Self::merge(call, fragment),
                    None => self.calls.push(Self::start(fragment)),
                }
            }
            FragmentKind::Continuation => {
                // Empty id extends the call started most recently.
                if let Some(call) = self.calls.last_mut() {
                    Self::merge(call, fragment);
                }
            }
            FragmentKind::Orphan => {
                warn!("dropping tool-call fragment with no id and no open call");
            }
        }
    }

    /// The assembled calls so far, in first-fragment order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ToolCall> {
        self.calls.clone()
    }

    fn classify(&self, fragment: &ToolCallFragment) -> FragmentKind {
        if !fragment.id_str().is_empty() {
            FragmentKind::HasId
        } else if self.calls.is_empty() {
            FragmentKind::Orphan
        } else {
            FragmentKind::Continuation
        }
    }

    fn start(fragment: &ToolCallFragment) -> ToolCall {
        ToolCall {
            id: fragment.id_str().to_string(),
            type_: fragment
                .type_
                .clone()
                .unwrap_or_else(|| "function".to_string()),
            function: FunctionCall {
                name: fragment.name().to_string(),
                arguments: fragment.arguments().to_string(),
            },
        }
    }

    fn merge(call: &mut ToolCall, fragment: &ToolCallFragment) {
        // Id and name are fixed at creation; only arguments grow. A fragment
        // that repeats the name fills it in solely when the call started
        // without one.
        if call.function.name.is_empty() {
            call.function.name.push_str(fragment.name());
        }
        call.function.arguments.push_str(fragment.arguments());
    }
}
