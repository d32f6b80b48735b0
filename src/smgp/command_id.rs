use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandId {
    Login = 0x0000_0001,
    LoginResp = 0x8000_0001,
    Submit = 0x0000_0002,
    SubmitResp = 0x8000_0002,
    Deliver = 0x0000_0003,
    DeliverResp = 0x8000_0003,
    ActiveTest = 0x0000_0004,
    ActiveTestResp = 0x8000_0004,
    // 0x00000005 is unassigned
    Exit = 0x0000_0006,
    ExitResp = 0x8000_0006,
}

impl CommandId {
    pub fn is_response(&self) -> bool {
        (*self as u32) & 0x8000_0000 != 0
    }
}
