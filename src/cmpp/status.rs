// ABOUTME: CMPP result code tables for connect, submit and deliver responses
// ABOUTME: Codes stay raw u32 on the wire; these enums give them names and descriptions

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// `CMPP_CONNECT_RESP.Status`
#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectStatus {
    Ok = 0,
    InvalidStructure = 1,
    /// Unknown client / illegal source address
    InvalidSourceAddr = 2,
    AuthFailed = 3,
    VersionTooHigh = 4,
    /// Anything else, including too many connections for the account
    Other = 5,
}

impl ConnectStatus {
    pub fn description(&self) -> &'static str {
        match self {
            ConnectStatus::Ok => "success",
            ConnectStatus::InvalidStructure => "invalid message structure",
            ConnectStatus::InvalidSourceAddr => "illegal source address",
            ConnectStatus::AuthFailed => "authentication failed",
            ConnectStatus::VersionTooHigh => "version too high",
            ConnectStatus::Other => "other error",
        }
    }
}

/// `CMPP_SUBMIT_RESP.Result`
#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitStatus {
    Ok = 0,
    InvalidStructure = 1,
    InvalidCommand = 2,
    DuplicateSequence = 3,
    InvalidLength = 4,
    InvalidFeeCode = 5,
    MessageTooLong = 6,
    InvalidServiceId = 7,
    FlowControl = 8,
    NotServingFeeTerminal = 9,
    InvalidSrcId = 10,
    InvalidMsgSrc = 11,
    InvalidFeeTerminalId = 12,
    InvalidDestTerminalId = 13,
}

impl SubmitStatus {
    pub fn description(&self) -> &'static str {
        match self {
            SubmitStatus::Ok => "success",
            SubmitStatus::InvalidStructure => "invalid message structure",
            SubmitStatus::InvalidCommand => "invalid command id",
            SubmitStatus::DuplicateSequence => "duplicate sequence id",
            SubmitStatus::InvalidLength => "invalid message length",
            SubmitStatus::InvalidFeeCode => "invalid fee code",
            SubmitStatus::MessageTooLong => "message too long",
            SubmitStatus::InvalidServiceId => "invalid service id",
            SubmitStatus::FlowControl => "flow control",
            SubmitStatus::NotServingFeeTerminal => "gateway does not serve the fee terminal",
            SubmitStatus::InvalidSrcId => "invalid Src_Id",
            SubmitStatus::InvalidMsgSrc => "invalid Msg_src",
            SubmitStatus::InvalidFeeTerminalId => "invalid Fee_terminal_Id",
            SubmitStatus::InvalidDestTerminalId => "invalid Dest_terminal_Id",
        }
    }
}

/// `CMPP_DELIVER_RESP.Result`
#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliverStatus {
    Ok = 0,
    InvalidStructure = 1,
    InvalidCommand = 2,
    DuplicateSequence = 3,
    InvalidLength = 4,
    InvalidFeeCode = 5,
    MessageTooLong = 6,
    InvalidServiceId = 7,
    FlowControl = 8,
    Unknown = 9,
}

/// Human-readable text for a connect status code
pub fn connect_description(code: u32) -> &'static str {
    ConnectStatus::try_from(code)
        .map(|s| s.description())
        .unwrap_or("unknown connect status")
}

/// Human-readable text for a submit result code
pub fn submit_description(code: u32) -> &'static str {
    SubmitStatus::try_from(code)
        .map(|s| s.description())
        .unwrap_or("unknown submit result")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_codes_describe() {
        assert_eq!(connect_description(3), "authentication failed");
        assert_eq!(submit_description(8), "flow control");
        assert_eq!(submit_description(99), "unknown submit result");
        assert_eq!(DeliverStatus::try_from(9).unwrap(), DeliverStatus::Unknown);
    }
}
