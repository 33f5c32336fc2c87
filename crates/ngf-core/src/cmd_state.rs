use crate::error::{NgfError, Result};

/// Lifecycle of a command buffer, shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmdBufferState {
    New,
    Ready,
    Recording,
    AwaitingSubmit,
    Submitted,
}

impl CmdBufferState {
    /// States from which recording may (re)open.
    pub fn is_recordable(self) -> bool {
        matches!(self, CmdBufferState::Ready | CmdBufferState::AwaitingSubmit)
    }
}

/// Move `state` to `requested` if the lifecycle allows it. On error `state`
/// is left untouched.
pub fn transition(
    state: &mut CmdBufferState,
    renderpass_active: bool,
    requested: CmdBufferState,
) -> Result<()> {
    let cur = *state;
    let allowed = match requested {
        CmdBufferState::New => false,
        CmdBufferState::Ready => matches!(
            cur,
            CmdBufferState::Submitted | CmdBufferState::Ready | CmdBufferState::New
        ),
        CmdBufferState::Recording => cur.is_recordable(),
        CmdBufferState::AwaitingSubmit => {
            if cur == CmdBufferState::Recording && renderpass_active {
                return Err(NgfError::invalid_op(
                    "cannot finish render encoder with unterminated render pass",
                ));
            }
            cur == CmdBufferState::Recording
        }
        CmdBufferState::Submitted => cur == CmdBufferState::AwaitingSubmit,
    };
    if !allowed {
        return Err(NgfError::invalid_op(format!(
            "command buffer cannot move from {cur:?} to {requested:?}"
        )));
    }
    *state = requested;
    Ok(())
}
