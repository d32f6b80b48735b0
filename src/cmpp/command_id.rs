use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandId {
    Connect = 0x0000_0001,
    ConnectResp = 0x8000_0001,
    Terminate = 0x0000_0002,
    TerminateResp = 0x8000_0002,
    // 0x00000003 is unassigned
    Submit = 0x0000_0004,
    SubmitResp = 0x8000_0004,
    Deliver = 0x0000_0005,
    DeliverResp = 0x8000_0005,
    Query = 0x0000_0006,
    QueryResp = 0x8000_0006,
    Cancel = 0x0000_0007,
    CancelResp = 0x8000_0007,
    ActiveTest = 0x0000_0008,
    ActiveTestResp = 0x8000_0008,
    Fwd = 0x0000_0009,
    FwdResp = 0x8000_0009,
}

impl CommandId {
    pub fn is_response(&self) -> bool {
        (*self as u32) & 0x8000_0000 != 0
    }
}
