// ABOUTME: SMGP link maintenance PDUs: active test and exit with their responses
// ABOUTME: All four are bare 12-byte headers

use crate::smgp::CommandId;

/// SMGP_ACTIVE_TEST
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveTest {
    pub sequence_id: u32,
}

impl_header_only_pdu!(ActiveTest, CommandId, CommandId::ActiveTest);

impl ActiveTest {
    pub fn to_response(&self) -> ActiveTestResp {
        ActiveTestResp::new(self.sequence_id)
    }
}

/// SMGP_ACTIVE_TEST_RESP
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveTestResp {
    pub sequence_id: u32,
}

impl_header_only_pdu!(ActiveTestResp, CommandId, CommandId::ActiveTestResp);

/// SMGP_EXIT
#[derive(Clone, Debug, PartialEq)]
pub struct Exit {
    pub sequence_id: u32,
}

impl_header_only_pdu!(Exit, CommandId, CommandId::Exit);

impl Exit {
    pub fn to_response(&self) -> ExitResp {
        ExitResp::new(self.sequence_id)
    }
}

/// SMGP_EXIT_RESP
#[derive(Clone, Debug, PartialEq)]
pub struct ExitResp {
    pub sequence_id: u32,
}

impl_header_only_pdu!(ExitResp, CommandId, CommandId::ExitResp);
