// ABOUTME: Server-side hooks each wire dialect provides: request kinds, login checks, submit replies
// ABOUTME: Keeps the handler chain generic while status codes and PDU shapes stay per protocol

use crate::auth::{AuthStore, ClientAuthRecord, Isp};
use crate::client::ClientDialect;
use crate::cmpp::{self, Cmpp};
use crate::codec::CodecError;
use crate::sequence::Sequences;
use crate::sgip::{self, Sgip};
use crate::smgp::{self, Smgp};
use std::sync::Arc;

/// What an inbound PDU asks of the server
#[derive(Debug, Clone, PartialEq)]
pub enum Request<F> {
    Login,
    Submit,
    Heartbeat { reply: F },
    HeartbeatAck,
    /// Acknowledgement of a deliver or report the server sent
    DeliveryAck,
    Terminate { reply: F },
    TerminateAck,
    Other,
}

/// Outcome of authenticating a login PDU
#[derive(Debug, Clone)]
pub struct LoginCheck {
    pub client_id: String,
    /// Version the session will speak
    pub version: u8,
    pub record: Option<Arc<ClientAuthRecord>>,
    /// 0 on success, otherwise the dialect's login status
    pub status: u32,
}

pub trait ServerDialect: ClientDialect {
    /// Submit status for rate-limited requests
    const FLOW_CONTROL: u32;

    /// Submit status for simulated failures
    const SUBMIT_FAILURE: u32;

    /// Login status when the account already has `max_conns` sessions
    const TOO_MANY_CONNECTIONS: u32;

    fn request(frame: &Self::Frame) -> Request<Self::Frame>;

    /// Authenticate a login PDU against `store`. `None` for other PDUs.
    fn check_login(frame: &Self::Frame, store: &dyn AuthStore) -> Option<LoginCheck>;

    fn login_response(frame: &Self::Frame, status: u32, record: Option<&ClientAuthRecord>) -> Option<Self::Frame>;

    fn submit_response(frame: &Self::Frame, status: u32, seqs: &Sequences) -> Option<Self::Frame>;

    /// Status report for an accepted submit and the response it got
    fn status_report(submit: &Self::Frame, response: &Self::Frame, seqs: &Sequences) -> Option<Self::Frame>;

    fn mock_mo(record: &ClientAuthRecord, sub_no: &str, text: &str, seqs: &Sequences) -> Result<Self::Frame, CodecError>;
}

fn secret(record: Option<&ClientAuthRecord>) -> &str {
    record.map_or("", |record| record.shared_secret.as_str())
}

impl ServerDialect for Cmpp {
    const FLOW_CONTROL: u32 = 8;
    const SUBMIT_FAILURE: u32 = 8;
    const TOO_MANY_CONNECTIONS: u32 = 5;

    fn request(frame: &cmpp::Frame) -> Request<cmpp::Frame> {
        match frame {
            cmpp::Frame::Connect(_) => Request::Login,
            cmpp::Frame::Submit(_) => Request::Submit,
            cmpp::Frame::ActiveTest(pdu) => Request::Heartbeat {
                reply: cmpp::Frame::ActiveTestResp(pdu.to_response()),
            },
            cmpp::Frame::ActiveTestResp(_) => Request::HeartbeatAck,
            cmpp::Frame::DeliverResp(_) => Request::DeliveryAck,
            cmpp::Frame::Terminate(pdu) => Request::Terminate {
                reply: cmpp::Frame::TerminateResp(pdu.to_response()),
            },
            cmpp::Frame::TerminateResp(_) => Request::TerminateAck,
            _ => Request::Other,
        }
    }

    fn check_login(frame: &cmpp::Frame, store: &dyn AuthStore) -> Option<LoginCheck> {
        let cmpp::Frame::Connect(connect) = frame else {
            return None;
        };
        let record = store.find(Isp::Cmpp, &connect.source_addr);
        let status = connect.check(record.as_deref());
        Some(LoginCheck {
            client_id: connect.source_addr.clone(),
            version: connect.version,
            record,
            status: status.into(),
        })
    }

    fn login_response(frame: &cmpp::Frame, status: u32, record: Option<&ClientAuthRecord>) -> Option<cmpp::Frame> {
        let cmpp::Frame::Connect(connect) = frame else {
            return None;
        };
        Some(cmpp::Frame::ConnectResp(connect.to_response(status, secret(record))))
    }

    fn submit_response(frame: &cmpp::Frame, status: u32, seqs: &Sequences) -> Option<cmpp::Frame> {
        let cmpp::Frame::Submit(submit) = frame else {
            return None;
        };
        Some(cmpp::Frame::SubmitResp(submit.to_response(status, seqs)))
    }

    fn status_report(submit: &cmpp::Frame, response: &cmpp::Frame, seqs: &Sequences) -> Option<cmpp::Frame> {
        match (submit, response) {
            (cmpp::Frame::Submit(submit), cmpp::Frame::SubmitResp(resp)) if resp.result == 0 => Some(
                cmpp::Frame::Deliver(Box::new(submit.to_delivery_report(resp.msg_id, seqs))),
            ),
            _ => None,
        }
    }

    fn mock_mo(record: &ClientAuthRecord, sub_no: &str, text: &str, seqs: &Sequences) -> Result<cmpp::Frame, CodecError> {
        cmpp::Deliver::mock_mo(record, sub_no, text, seqs).map(|pdu| cmpp::Frame::Deliver(Box::new(pdu)))
    }
}

impl ServerDialect for Sgip {
    const FLOW_CONTROL: u32 = 33;
    const SUBMIT_FAILURE: u32 = 33;
    const TOO_MANY_CONNECTIONS: u32 = 3;

    fn request(frame: &sgip::Frame) -> Request<sgip::Frame> {
        match frame {
            sgip::Frame::Bind(_) => Request::Login,
            sgip::Frame::Submit(_) => Request::Submit,
            sgip::Frame::DeliverResp(_) | sgip::Frame::ReportResp(_) => Request::DeliveryAck,
            sgip::Frame::Unbind(pdu) => Request::Terminate {
                reply: sgip::Frame::UnbindResp(pdu.to_response()),
            },
            sgip::Frame::UnbindResp(_) => Request::TerminateAck,
            _ => Request::Other,
        }
    }

    fn check_login(frame: &sgip::Frame, store: &dyn AuthStore) -> Option<LoginCheck> {
        let sgip::Frame::Bind(bind) = frame else {
            return None;
        };
        let record = store.find(Isp::Sgip, &bind.login_name);
        let status = bind.check(record.as_deref());
        Some(LoginCheck {
            client_id: bind.login_name.clone(),
            version: record.as_ref().map_or(sgip::V12, |record| record.version),
            record,
            status: u8::from(status).into(),
        })
    }

    fn login_response(frame: &sgip::Frame, status: u32, _record: Option<&ClientAuthRecord>) -> Option<sgip::Frame> {
        let sgip::Frame::Bind(bind) = frame else {
            return None;
        };
        Some(sgip::Frame::BindResp(bind.to_response(narrow(status))))
    }

    fn submit_response(frame: &sgip::Frame, status: u32, _seqs: &Sequences) -> Option<sgip::Frame> {
        let sgip::Frame::Submit(submit) = frame else {
            return None;
        };
        Some(sgip::Frame::SubmitResp(submit.to_response(narrow(status))))
    }

    /// Sent over the same link, keyed by the submit's sequence triple
    fn status_report(submit: &sgip::Frame, response: &sgip::Frame, seqs: &Sequences) -> Option<sgip::Frame> {
        match (submit, response) {
            (sgip::Frame::Submit(submit), sgip::Frame::SubmitResp(resp)) if resp.result == 0 => Some(
                sgip::Frame::Report(submit.to_report(sgip::STATE_DELIVERED, 0, seqs)),
            ),
            _ => None,
        }
    }

    fn mock_mo(record: &ClientAuthRecord, sub_no: &str, text: &str, seqs: &Sequences) -> Result<sgip::Frame, CodecError> {
        sgip::Deliver::mock_mo(record, sub_no, text, seqs).map(|pdu| sgip::Frame::Deliver(Box::new(pdu)))
    }
}

/// SGIP carries one-byte results
fn narrow(status: u32) -> u8 {
    u8::try_from(status).unwrap_or(u8::from(sgip::Status::SystemFailure))
}

impl ServerDialect for Smgp {
    const FLOW_CONTROL: u32 = 1;
    const SUBMIT_FAILURE: u32 = 75;
    const TOO_MANY_CONNECTIONS: u32 = 2;

    fn request(frame: &smgp::Frame) -> Request<smgp::Frame> {
        match frame {
            smgp::Frame::Login(_) => Request::Login,
            smgp::Frame::Submit(_) => Request::Submit,
            smgp::Frame::ActiveTest(pdu) => Request::Heartbeat {
                reply: smgp::Frame::ActiveTestResp(pdu.to_response()),
            },
            smgp::Frame::ActiveTestResp(_) => Request::HeartbeatAck,
            smgp::Frame::DeliverResp(_) => Request::DeliveryAck,
            smgp::Frame::Exit(pdu) => Request::Terminate {
                reply: smgp::Frame::ExitResp(pdu.to_response()),
            },
            smgp::Frame::ExitResp(_) => Request::TerminateAck,
            _ => Request::Other,
        }
    }

    fn check_login(frame: &smgp::Frame, store: &dyn AuthStore) -> Option<LoginCheck> {
        let smgp::Frame::Login(login) = frame else {
            return None;
        };
        let record = store.find(Isp::Smgp, &login.client_id);
        let status = login.check(record.as_deref());
        Some(LoginCheck {
            client_id: login.client_id.clone(),
            version: login.version,
            record,
            status: status.into(),
        })
    }

    fn login_response(frame: &smgp::Frame, status: u32, record: Option<&ClientAuthRecord>) -> Option<smgp::Frame> {
        let smgp::Frame::Login(login) = frame else {
            return None;
        };
        Some(smgp::Frame::LoginResp(login.to_response(status, secret(record))))
    }

    fn submit_response(frame: &smgp::Frame, status: u32, seqs: &Sequences) -> Option<smgp::Frame> {
        let smgp::Frame::Submit(submit) = frame else {
            return None;
        };
        Some(smgp::Frame::SubmitResp(submit.to_response(status, seqs)))
    }

    fn status_report(submit: &smgp::Frame, response: &smgp::Frame, seqs: &Sequences) -> Option<smgp::Frame> {
        match (submit, response) {
            (smgp::Frame::Submit(submit), smgp::Frame::SubmitResp(resp)) if resp.status == 0 => Some(
                smgp::Frame::Deliver(Box::new(submit.to_delivery_report(resp.msg_id, seqs))),
            ),
            _ => None,
        }
    }

    fn mock_mo(record: &ClientAuthRecord, sub_no: &str, text: &str, seqs: &Sequences) -> Result<smgp::Frame, CodecError> {
        smgp::Deliver::mock_mo(record, sub_no, text, seqs).map(|pdu| smgp::Frame::Deliver(Box::new(pdu)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryAuthStore;

    fn store() -> MemoryAuthStore {
        [
            ClientAuthRecord::new(Isp::Cmpp, "901234", "secret", cmpp::V30),
            ClientAuthRecord::new(Isp::Sgip, "sp01", "pwd", sgip::V12),
            ClientAuthRecord::new(Isp::Smgp, "10010", "secret", smgp::V30),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn cmpp_connect_is_authenticated() {
        let store = store();
        let seqs = Sequences::default();
        let record = store.find(Isp::Cmpp, "901234").unwrap();
        let login = Cmpp::login_frame(&record, &seqs);

        let check = Cmpp::check_login(&login, &store).unwrap();
        assert_eq!(check.status, 0);
        assert_eq!(check.client_id, "901234");

        let response = Cmpp::login_response(&login, check.status, check.record.as_deref()).unwrap();
        assert!(Cmpp::check_login_response(&response, &record).is_ok());
    }

    #[test]
    fn unknown_clients_fail_with_dialect_status() {
        let store = store();
        let seqs = Sequences::default();
        let stranger = ClientAuthRecord::new(Isp::Smgp, "99999", "secret", smgp::V30);
        let check = Smgp::check_login(&Smgp::login_frame(&stranger, &seqs), &store).unwrap();
        assert_eq!(check.status, 21);
        assert!(check.record.is_none());

        let stranger = ClientAuthRecord::new(Isp::Sgip, "sp01", "wrong", sgip::V12);
        let check = Sgip::check_login(&Sgip::login_frame(&stranger, &seqs), &store).unwrap();
        assert_eq!(check.status, u32::from(u8::from(sgip::Status::IllegalLogin)));
    }

    #[test]
    fn accepted_submit_gets_a_report_rejected_does_not() {
        let store = store();
        let seqs = Sequences::default();
        let record = store.find(Isp::Smgp, "10010").unwrap();
        let phones = vec!["18912345678".to_string()];
        let (_, submit) = Smgp::submits(&record, &phones, "hi", &Default::default(), &seqs)
            .unwrap()
            .remove(0);

        let ok = Smgp::submit_response(&submit, 0, &seqs).unwrap();
        assert!(Smgp::status_report(&submit, &ok, &seqs).is_some());

        let failed = Smgp::submit_response(&submit, Smgp::SUBMIT_FAILURE, &seqs).unwrap();
        assert!(Smgp::status_report(&submit, &failed, &seqs).is_none());
    }

    #[test]
    fn sgip_unbind_is_a_terminate() {
        let seqs = Sequences::default();
        let unbind = Sgip::terminate(&seqs);
        assert!(matches!(Sgip::request(&unbind), Request::Terminate { reply: sgip::Frame::UnbindResp(_) }));
        assert!(Sgip::active_test(&seqs).is_none());
    }
}
