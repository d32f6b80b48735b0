// ABOUTME: Client-side behaviour each wire dialect plugs into the generic session
// ABOUTME: Builds login/heartbeat/terminate/submit frames and classifies inbound frames for the reader task

use crate::auth::ClientAuthRecord;
use crate::cmpp::{self, Cmpp};
use crate::codec::CodecError;
use crate::datatypes::MtOptions;
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::Protocol;
use crate::sequence::Sequences;
use crate::sgip::{self, Sgip};
use crate::smgp::{self, Smgp};

/// What the reader task should do with an inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound<F> {
    /// Peer heartbeat; answer with `reply`
    Heartbeat { reply: F },
    HeartbeatAck,
    /// Peer wants out; answer, then close
    Terminate { reply: F },
    TerminateAck,
    SubmitResp {
        sequence: String,
        result: u32,
        /// Only present on success
        msg_id: Option<String>,
    },
    Report { reply: F, msg_id: String, stat: String },
    MoMessage { reply: F, from: String, to: String, text: String },
    /// Nothing to do (stray responses, opaque commands)
    Ignored,
}

/// Client role of a wire dialect
pub trait ClientDialect: Protocol {
    /// Name of the login response, for error messages
    const LOGIN_RESP: &'static str;

    fn login_frame(record: &ClientAuthRecord, seqs: &Sequences) -> Self::Frame;

    /// Accept only a successful login response of the right type
    fn check_login_response(frame: &Self::Frame, record: &ClientAuthRecord) -> GatewayResult<()>;

    /// `None` when the dialect has no heartbeat PDU (SGIP)
    fn active_test(seqs: &Sequences) -> Option<Self::Frame>;

    fn terminate(seqs: &Sequences) -> Self::Frame;

    /// Submit frames for one message, keyed by their printable sequence
    fn submits(
        record: &ClientAuthRecord,
        phones: &[String],
        content: &str,
        options: &MtOptions,
        seqs: &Sequences,
    ) -> Result<Vec<(String, Self::Frame)>, CodecError>;

    fn classify(frame: &Self::Frame) -> Inbound<Self::Frame>;
}

fn unexpected<P: Protocol>(expected: &str, frame: &P::Frame) -> GatewayError {
    GatewayError::UnexpectedPdu {
        expected: expected.to_string(),
        actual: format!("{:#x}", P::command_of(frame)),
    }
}

/// CMPP message ids are tracked as 16 hex digits
pub fn cmpp_msg_id(msg_id: u64) -> String {
    format!("{msg_id:016x}")
}

impl ClientDialect for Cmpp {
    const LOGIN_RESP: &'static str = "CMPP_CONNECT_RESP";

    fn login_frame(record: &ClientAuthRecord, seqs: &Sequences) -> cmpp::Frame {
        cmpp::Frame::Connect(cmpp::Connect::new(record, seqs.seq32.next_val()))
    }

    fn check_login_response(frame: &cmpp::Frame, record: &ClientAuthRecord) -> GatewayResult<()> {
        let cmpp::Frame::ConnectResp(resp) = frame else {
            return Err(unexpected::<Cmpp>(Self::LOGIN_RESP, frame));
        };
        if resp.status != 0 {
            return Err(GatewayError::Protocol {
                status: resp.status,
                description: cmpp::status::connect_description(resp.status),
            });
        }
        if !resp.verify(&record.client_id, &record.shared_secret) {
            return Err(GatewayError::InvalidState("gateway authenticator mismatch".into()));
        }
        Ok(())
    }

    fn active_test(seqs: &Sequences) -> Option<cmpp::Frame> {
        Some(cmpp::Frame::ActiveTest(cmpp::ActiveTest::new(seqs.seq32.next_val())))
    }

    fn terminate(seqs: &Sequences) -> cmpp::Frame {
        cmpp::Frame::Terminate(cmpp::Terminate::new(seqs.seq32.next_val()))
    }

    fn submits(
        record: &ClientAuthRecord,
        phones: &[String],
        content: &str,
        options: &MtOptions,
        seqs: &Sequences,
    ) -> Result<Vec<(String, cmpp::Frame)>, CodecError> {
        let submits = cmpp::Submit::build(record, phones, content, options, seqs.seq32.next_val(), seqs)?;
        Ok(submits
            .into_iter()
            .map(|submit| (submit.sequence_id.to_string(), cmpp::Frame::Submit(Box::new(submit))))
            .collect())
    }

    fn classify(frame: &cmpp::Frame) -> Inbound<cmpp::Frame> {
        match frame {
            cmpp::Frame::ActiveTest(pdu) => Inbound::Heartbeat {
                reply: cmpp::Frame::ActiveTestResp(pdu.to_response()),
            },
            cmpp::Frame::ActiveTestResp(_) => Inbound::HeartbeatAck,
            cmpp::Frame::Terminate(pdu) => Inbound::Terminate {
                reply: cmpp::Frame::TerminateResp(pdu.to_response()),
            },
            cmpp::Frame::TerminateResp(_) => Inbound::TerminateAck,
            cmpp::Frame::SubmitResp(pdu) => Inbound::SubmitResp {
                sequence: pdu.sequence_id.to_string(),
                result: pdu.result,
                msg_id: (pdu.result == 0).then(|| cmpp_msg_id(pdu.msg_id)),
            },
            cmpp::Frame::Deliver(pdu) => {
                let reply = cmpp::Frame::DeliverResp(pdu.to_response(0));
                match pdu.report() {
                    Some(report) => Inbound::Report {
                        reply,
                        msg_id: cmpp_msg_id(report.msg_id),
                        stat: report.stat.clone(),
                    },
                    None => Inbound::MoMessage {
                        reply,
                        from: pdu.src_terminal_id.clone(),
                        to: pdu.dest_id.clone(),
                        text: pdu.text().unwrap_or_default(),
                    },
                }
            }
            _ => Inbound::Ignored,
        }
    }
}

impl ClientDialect for Sgip {
    const LOGIN_RESP: &'static str = "SGIP_BIND_RESP";

    fn login_frame(record: &ClientAuthRecord, seqs: &Sequences) -> sgip::Frame {
        sgip::Frame::Bind(sgip::Bind::new(record, seqs.triple.next_val()))
    }

    fn check_login_response(frame: &sgip::Frame, _record: &ClientAuthRecord) -> GatewayResult<()> {
        let sgip::Frame::BindResp(resp) = frame else {
            return Err(unexpected::<Sgip>(Self::LOGIN_RESP, frame));
        };
        if resp.result != 0 {
            let status = u32::from(resp.result);
            return Err(GatewayError::Protocol {
                status,
                description: sgip::status::description(status),
            });
        }
        Ok(())
    }

    fn active_test(_seqs: &Sequences) -> Option<sgip::Frame> {
        None
    }

    fn terminate(seqs: &Sequences) -> sgip::Frame {
        sgip::Frame::Unbind(sgip::Unbind::new(seqs.triple.next_val()))
    }

    fn submits(
        record: &ClientAuthRecord,
        phones: &[String],
        content: &str,
        options: &MtOptions,
        seqs: &Sequences,
    ) -> Result<Vec<(String, sgip::Frame)>, CodecError> {
        let submits = sgip::Submit::build(record, phones, content, options, seqs.triple.next_val(), seqs)?;
        Ok(submits
            .into_iter()
            .map(|submit| (submit.sequence.to_string(), sgip::Frame::Submit(Box::new(submit))))
            .collect())
    }

    fn classify(frame: &sgip::Frame) -> Inbound<sgip::Frame> {
        match frame {
            sgip::Frame::Unbind(pdu) => Inbound::Terminate {
                reply: sgip::Frame::UnbindResp(pdu.to_response()),
            },
            sgip::Frame::UnbindResp(_) => Inbound::TerminateAck,
            // The submit triple doubles as the message id
            sgip::Frame::SubmitResp(pdu) => Inbound::SubmitResp {
                sequence: pdu.sequence.to_string(),
                result: u32::from(pdu.result),
                msg_id: (pdu.result == 0).then(|| pdu.sequence.to_string()),
            },
            sgip::Frame::Report(pdu) => Inbound::Report {
                reply: sgip::Frame::ReportResp(pdu.to_response(0)),
                msg_id: pdu.submit_sequence.to_string(),
                stat: pdu.stat().to_string(),
            },
            sgip::Frame::Deliver(pdu) => Inbound::MoMessage {
                reply: sgip::Frame::DeliverResp(pdu.to_response(0)),
                from: pdu.user_number.clone(),
                to: pdu.sp_number.clone(),
                text: pdu.text(),
            },
            _ => Inbound::Ignored,
        }
    }
}

impl ClientDialect for Smgp {
    const LOGIN_RESP: &'static str = "SMGP_LOGIN_RESP";

    fn login_frame(record: &ClientAuthRecord, seqs: &Sequences) -> smgp::Frame {
        smgp::Frame::Login(smgp::Login::new(record, seqs.seq32.next_val()))
    }

    fn check_login_response(frame: &smgp::Frame, record: &ClientAuthRecord) -> GatewayResult<()> {
        let smgp::Frame::LoginResp(resp) = frame else {
            return Err(unexpected::<Smgp>(Self::LOGIN_RESP, frame));
        };
        if resp.status != 0 {
            return Err(GatewayError::Protocol {
                status: resp.status,
                description: smgp::status::description(resp.status),
            });
        }
        if !resp.verify(&record.client_id, &record.shared_secret) {
            return Err(GatewayError::InvalidState("gateway authenticator mismatch".into()));
        }
        Ok(())
    }

    fn active_test(seqs: &Sequences) -> Option<smgp::Frame> {
        Some(smgp::Frame::ActiveTest(smgp::ActiveTest::new(seqs.seq32.next_val())))
    }

    fn terminate(seqs: &Sequences) -> smgp::Frame {
        smgp::Frame::Exit(smgp::Exit::new(seqs.seq32.next_val()))
    }

    fn submits(
        record: &ClientAuthRecord,
        phones: &[String],
        content: &str,
        options: &MtOptions,
        seqs: &Sequences,
    ) -> Result<Vec<(String, smgp::Frame)>, CodecError> {
        let submits = smgp::Submit::build(record, phones, content, options, seqs.seq32.next_val(), seqs)?;
        Ok(submits
            .into_iter()
            .map(|submit| (submit.sequence_id.to_string(), smgp::Frame::Submit(Box::new(submit))))
            .collect())
    }

    fn classify(frame: &smgp::Frame) -> Inbound<smgp::Frame> {
        match frame {
            smgp::Frame::ActiveTest(pdu) => Inbound::Heartbeat {
                reply: smgp::Frame::ActiveTestResp(pdu.to_response()),
            },
            smgp::Frame::ActiveTestResp(_) => Inbound::HeartbeatAck,
            smgp::Frame::Exit(pdu) => Inbound::Terminate {
                reply: smgp::Frame::ExitResp(pdu.to_response()),
            },
            smgp::Frame::ExitResp(_) => Inbound::TerminateAck,
            smgp::Frame::SubmitResp(pdu) => Inbound::SubmitResp {
                sequence: pdu.sequence_id.to_string(),
                result: pdu.status,
                msg_id: (pdu.status == 0).then(|| pdu.msg_id_string()),
            },
            smgp::Frame::Deliver(pdu) => {
                let reply = smgp::Frame::DeliverResp(pdu.to_response(0));
                match pdu.report() {
                    Some(report) => Inbound::Report {
                        reply,
                        msg_id: report.id_string(),
                        stat: report.stat.clone(),
                    },
                    None => Inbound::MoMessage {
                        reply,
                        from: pdu.src_term_id.clone(),
                        to: pdu.dest_term_id.clone(),
                        text: pdu.text().unwrap_or_default(),
                    },
                }
            }
            _ => Inbound::Ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Isp;
    use crate::sequence::SequenceTriple;

    fn record(isp: Isp, client_id: &str, version: u8) -> ClientAuthRecord {
        ClientAuthRecord::new(isp, client_id, "888888", version).with_display_no("10655")
    }

    #[test]
    fn cmpp_login_response_is_verified() {
        let seqs = Sequences::default();
        let record = record(Isp::Cmpp, "123456", cmpp::V30);
        let cmpp::Frame::Connect(connect) = Cmpp::login_frame(&record, &seqs) else {
            panic!("expected connect");
        };

        let ok = cmpp::Frame::ConnectResp(connect.to_response(0, "888888"));
        assert!(Cmpp::check_login_response(&ok, &record).is_ok());

        let forged = cmpp::Frame::ConnectResp(connect.to_response(0, "wrong"));
        assert!(matches!(
            Cmpp::check_login_response(&forged, &record),
            Err(GatewayError::InvalidState(_))
        ));

        let refused = cmpp::Frame::ConnectResp(connect.to_response(3, "888888"));
        assert!(matches!(
            Cmpp::check_login_response(&refused, &record),
            Err(GatewayError::Protocol { status: 3, .. })
        ));

        let wrong_type = cmpp::Frame::ActiveTest(cmpp::ActiveTest::new(1));
        assert!(matches!(
            Cmpp::check_login_response(&wrong_type, &record),
            Err(GatewayError::UnexpectedPdu { .. })
        ));
    }

    #[test]
    fn cmpp_report_is_keyed_by_hex_msg_id() {
        let seqs = Sequences::default();
        let record = record(Isp::Cmpp, "123456", cmpp::V30);
        let frames = Cmpp::submits(&record, &["13800138000".into()], "hi", &MtOptions::new(), &seqs).unwrap();
        let cmpp::Frame::Submit(submit) = &frames[0].1 else {
            panic!("expected submit");
        };

        let resp = submit.to_response(0, &seqs);
        let Inbound::SubmitResp { msg_id: Some(msg_id), .. } = Cmpp::classify(&cmpp::Frame::SubmitResp(resp.clone()))
        else {
            panic!("expected submit response");
        };
        assert_eq!(msg_id.len(), 16);

        let report = submit.to_delivery_report(resp.msg_id, &seqs);
        match Cmpp::classify(&cmpp::Frame::Deliver(Box::new(report))) {
            Inbound::Report { msg_id: reported, reply, .. } => {
                assert_eq!(reported, msg_id);
                assert!(matches!(reply, cmpp::Frame::DeliverResp(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn sgip_has_no_heartbeat_and_reports_by_triple() {
        let seqs = Sequences::default();
        let record = record(Isp::Sgip, "3053112345", sgip::V12);
        assert!(Sgip::active_test(&seqs).is_none());

        let frames = Sgip::submits(&record, &["13000000000".into()], "hello", &MtOptions::new(), &seqs).unwrap();
        let sgip::Frame::Submit(submit) = &frames[0].1 else {
            panic!("expected submit");
        };
        assert_eq!(frames[0].0, submit.sequence.to_string());

        let resp = sgip::Frame::SubmitResp(submit.to_response(0));
        assert_eq!(
            Sgip::classify(&resp),
            Inbound::SubmitResp {
                sequence: frames[0].0.clone(),
                result: 0,
                msg_id: Some(frames[0].0.clone()),
            }
        );

        let report = submit.to_report(sgip::STATE_DELIVERED, 0, &seqs);
        let Inbound::Report { msg_id, stat, .. } = Sgip::classify(&sgip::Frame::Report(report)) else {
            panic!("expected report");
        };
        assert_eq!(msg_id, frames[0].0);
        assert_eq!(stat, "DELIVRD");

        let unbind = sgip::Frame::Unbind(sgip::Unbind::new(SequenceTriple {
            node_id: 1,
            timestamp: 1,
            counter: 1,
        }));
        assert!(matches!(Sgip::classify(&unbind), Inbound::Terminate { .. }));
    }

    #[test]
    fn smgp_failed_submit_has_no_msg_id() {
        let seqs = Sequences::default();
        let record = record(Isp::Smgp, "12345678", smgp::V30);
        let frames = Smgp::submits(&record, &["13300000000".into()], "hello", &MtOptions::new(), &seqs).unwrap();
        let smgp::Frame::Submit(submit) = &frames[0].1 else {
            panic!("expected submit");
        };

        let resp = smgp::Frame::SubmitResp(submit.to_response(75, &seqs));
        assert!(matches!(
            Smgp::classify(&resp),
            Inbound::SubmitResp { result: 75, msg_id: None, .. }
        ));
        assert!(matches!(
            Smgp::classify(&Smgp::terminate(&seqs)),
            Inbound::Terminate { reply: smgp::Frame::ExitResp(_) }
        ));
    }
}
