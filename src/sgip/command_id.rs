use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandId {
    Bind = 0x0000_0001,
    BindResp = 0x8000_0001,
    Unbind = 0x0000_0002,
    UnbindResp = 0x8000_0002,
    Submit = 0x0000_0003,
    SubmitResp = 0x8000_0003,
    Deliver = 0x0000_0004,
    DeliverResp = 0x8000_0004,
    Report = 0x0000_0005,
    ReportResp = 0x8000_0005,
}
