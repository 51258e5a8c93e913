//! # Appliance Actions
//!
//! Named bench actions for the laundry controller, expressed as ERD
//! commands and reads over the bus.

use std::fmt;
use std::str::FromStr;

use crate::erd::command::CommandStyle;
use crate::erd::schema::ErdId;

/// Cap-touch key press commands
pub const ERD_CAP_TOUCH_COMMAND: ErdId = ErdId(0xF012);
/// Machine status
pub const ERD_MACHINE_STATUS: ErdId = ErdId(0xF301);
/// Machine substatus
pub const ERD_MACHINE_SUBSTATUS: ErdId = ErdId(0xF302);
/// Currently selected cycle
pub const ERD_SELECTED_CYCLE: ErdId = ErdId(0xF307);
/// Cycle selection
pub const ERD_CYCLE_SELECT: ErdId = ErdId(0xF403);
/// Test mode enable
pub const ERD_TEST_MODE: ErdId = ErdId(0xF42A);
/// 2D moisture level
pub const ERD_MOISTURE_LEVEL: ErdId = ErdId(0xF42B);

/// Bus operation an action translates to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusRequest {
    /// Validated command write
    Command {
        erd: ErdId,
        value: String,
        style: CommandStyle,
    },
    /// Read request for an ERD
    Read(ErdId),
    /// Bare start/pause request message
    StartPause,
}

/// High-level appliance actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplianceCommand {
    DryerStartPause,
    WasherStartPause,
    PowerKeyPress,
    PowerKeyQuickHold,
    PowerKeyShortHold,
    PowerKeyLongHold,
    /// Select a cycle by its dictionary value
    SetCycle(u8),
    EnableTestMode,
    /// Set the 2D moisture level
    SetMoistureLevel(u8),
    /// Send the bare start/pause request message
    StartPauseRequest,
    GetMachineStatus,
    GetMachineSubstatus,
    GetSelectedCycle,
    /// Read any ERD
    ReadErd(ErdId),
}

impl ApplianceCommand {
    /// The bus operation for this action
    pub fn request(&self) -> BusRequest {
        let key_press = |value: &str| BusRequest::Command {
            erd: ERD_CAP_TOUCH_COMMAND,
            value: value.to_string(),
            style: CommandStyle::KeyPress,
        };

        match *self {
            ApplianceCommand::DryerStartPause => key_press("11"),
            ApplianceCommand::WasherStartPause => key_press("10"),
            ApplianceCommand::PowerKeyPress => key_press("1"),
            ApplianceCommand::PowerKeyQuickHold => key_press("2"),
            ApplianceCommand::PowerKeyShortHold => key_press("3"),
            ApplianceCommand::PowerKeyLongHold => key_press("4"),
            ApplianceCommand::SetCycle(cycle) => BusRequest::Command {
                erd: ERD_CYCLE_SELECT,
                value: cycle.to_string(),
                style: CommandStyle::Publish,
            },
            ApplianceCommand::EnableTestMode => BusRequest::Command {
                erd: ERD_TEST_MODE,
                value: "1".to_string(),
                style: CommandStyle::Write,
            },
            ApplianceCommand::SetMoistureLevel(level) => BusRequest::Command {
                erd: ERD_MOISTURE_LEVEL,
                value: level.to_string(),
                style: CommandStyle::Write,
            },
            ApplianceCommand::StartPauseRequest => BusRequest::StartPause,
            ApplianceCommand::GetMachineStatus => BusRequest::Read(ERD_MACHINE_STATUS),
            ApplianceCommand::GetMachineSubstatus => BusRequest::Read(ERD_MACHINE_SUBSTATUS),
            ApplianceCommand::GetSelectedCycle => BusRequest::Read(ERD_SELECTED_CYCLE),
            ApplianceCommand::ReadErd(erd) => BusRequest::Read(erd),
        }
    }
}

/// Error parsing an action name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCommandError(pub String);

impl fmt::Display for ParseCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown appliance command '{}'", self.0)
    }
}

impl std::error::Error for ParseCommandError {}

impl FromStr for ApplianceCommand {
    type Err = ParseCommandError;

    /// Parse `name` or `name=value`, e.g. `dryer-start-pause`, `set-moisture=3`, `read=f301`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseCommandError(s.to_string());
        let (name, arg) = match s.split_once('=') {
            Some((name, arg)) => (name, Some(arg)),
            None => (s, None),
        };
        let number = |arg: Option<&str>| arg.and_then(|a| a.parse::<u8>().ok()).ok_or_else(err);

        let command = match name {
            "dryer-start-pause" => ApplianceCommand::DryerStartPause,
            "washer-start-pause" => ApplianceCommand::WasherStartPause,
            "power-key" => ApplianceCommand::PowerKeyPress,
            "power-key-quickhold" => ApplianceCommand::PowerKeyQuickHold,
            "power-key-shorthold" => ApplianceCommand::PowerKeyShortHold,
            "power-key-longhold" => ApplianceCommand::PowerKeyLongHold,
            "set-cycle" => ApplianceCommand::SetCycle(number(arg)?),
            "enable-test-mode" => ApplianceCommand::EnableTestMode,
            "set-moisture" => ApplianceCommand::SetMoistureLevel(number(arg)?),
            "start-pause-request" => ApplianceCommand::StartPauseRequest,
            "machine-status" => ApplianceCommand::GetMachineStatus,
            "machine-substatus" => ApplianceCommand::GetMachineSubstatus,
            "selected-cycle" => ApplianceCommand::GetSelectedCycle,
            "read" => ApplianceCommand::ReadErd(
                arg.and_then(|a| a.parse::<ErdId>().ok()).ok_or_else(err)?,
            ),
            _ => return Err(err()),
        };

        if arg.is_some() && !matches!(
            command,
            ApplianceCommand::SetCycle(_) | ApplianceCommand::SetMoistureLevel(_) | ApplianceCommand::ReadErd(_)
        ) {
            return Err(err());
        }

        Ok(command)
    }
}
