//! Session states and the actions each one enables.

use std::fmt;

use bitflags::bitflags;

/// Lifecycle state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SessionState {
    /// No transport is held.
    #[default]
    Disconnected,
    /// Port selection and bootloader handshake in progress.
    Connecting,
    /// Chip validated, idle.
    Connected,
    /// Erase/write in progress.
    Flashing,
    /// Reset chain in progress.
    Resetting,
    /// A failure is being reported; the session settles right after.
    Error,
}

impl SessionState {
    /// Whether an operation is in flight.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Connecting | Self::Flashing | Self::Resetting)
    }

    /// Whether a transport handle exists in this state.
    pub fn holds_transport(self) -> bool {
        matches!(self, Self::Connected | Self::Flashing | Self::Resetting)
    }

    /// Actions a user may trigger in this state.
    pub fn allowed_actions(self) -> ActionSet {
        match self {
            Self::Disconnected => ActionSet::CONNECT,
            Self::Connected => ActionSet::FLASH | ActionSet::RESET | ActionSet::DISCONNECT,
            Self::Connecting | Self::Flashing | Self::Resetting | Self::Error => {
                ActionSet::DISCONNECT
            },
        }
    }

    /// Connectivity indicator color.
    pub fn indicator(self) -> Indicator {
        match self {
            Self::Disconnected | Self::Error => Indicator::Bad,
            Self::Connecting | Self::Flashing | Self::Resetting => Indicator::Warn,
            Self::Connected => Indicator::Ok,
        }
    }

    /// Default status line for this state.
    pub fn status(self) -> &'static str {
        match self {
            Self::Disconnected => "Not connected",
            Self::Connecting => "Connecting...",
            Self::Connected => "Connected",
            Self::Flashing => "Flashing...",
            Self::Resetting => "Resetting...",
            Self::Error => "Failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Flashing => "flashing",
            Self::Resetting => "resetting",
            Self::Error => "reporting an error",
        };
        f.write_str(s)
    }
}

/// A user-triggered session action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Open a port and identify the chip.
    Connect,
    /// Erase (optionally) and write an image.
    Flash,
    /// Restart the chip.
    Reset,
    /// Release the port.
    Disconnect,
}

impl Action {
    /// All actions in menu order.
    pub const ALL: [Self; 4] = [Self::Connect, Self::Flash, Self::Reset, Self::Disconnect];
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connect => "connect",
            Self::Flash => "flash",
            Self::Reset => "reset",
            Self::Disconnect => "disconnect",
        };
        f.write_str(s)
    }
}

bitflags! {
    /// Set of enabled actions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ActionSet: u8 {
        /// [`Action::Connect`].
        const CONNECT = 1 << 0;
        /// [`Action::Flash`].
        const FLASH = 1 << 1;
        /// [`Action::Reset`].
        const RESET = 1 << 2;
        /// [`Action::Disconnect`].
        const DISCONNECT = 1 << 3;
    }
}

impl From<Action> for ActionSet {
    fn from(action: Action) -> Self {
        match action {
            Action::Connect => Self::CONNECT,
            Action::Flash => Self::FLASH,
            Action::Reset => Self::RESET,
            Action::Disconnect => Self::DISCONNECT,
        }
    }
}

impl ActionSet {
    /// Whether `action` is enabled.
    pub fn allows(self, action: Action) -> bool {
        self.contains(action.into())
    }

    /// Enabled actions in menu order.
    pub fn actions(self) -> Vec<Action> {
        Action::ALL
            .into_iter()
            .filter(|a| self.allows(*a))
            .collect()
    }
}

/// Connectivity indicator shown next to the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Indicator {
    /// Not usable (red).
    Bad,
    /// Working (yellow).
    Warn,
    /// Ready (green).
    Ok,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [SessionState; 6] = [
        SessionState::Disconnected,
        SessionState::Connecting,
        SessionState::Connected,
        SessionState::Flashing,
        SessionState::Resetting,
        SessionState::Error,
    ];

    #[test]
    fn test_exactly_one_action_group_enabled() {
        for state in ALL_STATES {
            let set = state.allowed_actions();
            assert!(!set.is_empty(), "{state:?} enables nothing");
            let connect_only = set == ActionSet::CONNECT;
            let connected_group = set.contains(ActionSet::FLASH | ActionSet::RESET);
            assert!(connect_only || connected_group || set == ActionSet::DISCONNECT);
        }
    }

    #[test]
    fn test_busy_states_only_allow_disconnect() {
        for state in ALL_STATES.into_iter().filter(|s| s.is_busy()) {
            assert_eq!(state.allowed_actions().actions(), vec![Action::Disconnect]);
            assert_eq!(state.indicator(), Indicator::Warn);
        }
    }

    #[test]
    fn test_connected_menu() {
        assert_eq!(
            SessionState::Connected.allowed_actions().actions(),
            vec![Action::Flash, Action::Reset, Action::Disconnect]
        );
        assert_eq!(SessionState::Connected.indicator(), Indicator::Ok);
        assert!(SessionState::Connected.holds_transport());
        assert!(!SessionState::Disconnected.holds_transport());
    }

    #[test]
    fn test_display_is_lowercase() {
        assert_eq!(SessionState::Flashing.to_string(), "flashing");
        assert_eq!(Action::Connect.to_string(), "connect");
        assert_eq!(SessionState::Disconnected.status(), "Not connected");
    }
}
