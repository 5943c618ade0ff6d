use crate::hw::PcmState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrunKind {
    Underrun,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Issue a prepare and poll again.
    Prepare,
    /// Fill the whole buffer if it is empty, otherwise start the transport.
    PrimeOrStart,
    /// Block for readiness, then fill whatever is available.
    WaitAndFill,
    Recover(XrunKind),
    /// The stream is gone; leave the loop.
    Exit,
}

/// Maps the state reported by the hardware to the next loop action. The loop
/// keeps no state of its own.
pub fn next_action(state: PcmState) -> Action {
    match state {
        PcmState::Setup => Action::Prepare,
        PcmState::Prepared => Action::PrimeOrStart,
        PcmState::Running | PcmState::Paused => Action::WaitAndFill,
        PcmState::XRun => Action::Recover(XrunKind::Underrun),
        PcmState::Suspended => Action::Recover(XrunKind::Suspended),
        PcmState::Open | PcmState::Draining | PcmState::Disconnected => Action::Exit,
    }
}
