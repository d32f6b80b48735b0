//! Loopback tests running the client side against the mock server

#[cfg(test)]
mod integration_tests {
    use crate::auth::{ClientAuthRecord, Isp, MemoryAuthStore};
    use crate::client::{ClientConfig, ClientDialect, FactoryConfig, Gateway, GatewayConfig, Session, SessionFactory};
    use crate::cmpp::{self, Cmpp};
    use crate::connection::Connection;
    use crate::datatypes::MtOptions;
    use crate::error::GatewayError;
    use crate::flow_control::Window;
    use crate::heartbeat::HeartbeatConfig;
    use crate::sequence::Sequences;
    use crate::server::{MockConfig, Server, ServerConfig, ServerDialect, ServerHandle};
    use crate::sgip::{self, Sgip};
    use crate::smgp::{self, Smgp};
    use crate::tracking::{MemorySink, ResultSink, SendResult, Tracker};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    const PHONE: &str = "13800138000";

    async fn serve<P: ServerDialect>(config: ServerConfig, records: Vec<ClientAuthRecord>) -> (SocketAddr, ServerHandle<P>) {
        let store: MemoryAuthStore = records.into_iter().collect();
        let server = Server::<P>::bind(config, Arc::new(store)).await.unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.handle();
        tokio::spawn(server.run());
        (addr, handle)
    }

    fn local() -> ServerConfig {
        ServerConfig::new("127.0.0.1:0")
    }

    async fn connect<P: ClientDialect>(addr: SocketAddr, record: &ClientAuthRecord, tracker: &Arc<Tracker>) -> crate::GatewayResult<Arc<Session<P>>> {
        Session::<P>::connect(
            &addr.to_string(),
            ClientConfig::default(),
            Arc::new(record.clone()),
            Arc::new(Sequences::default()),
            Arc::clone(tracker),
            Window::new(16),
        )
        .await
    }

    /// Poll until `done` holds or two seconds pass
    async fn eventually(mut done: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if done() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        done()
    }

    fn settled(result: Option<SendResult>) -> bool {
        result.is_some_and(|r| r.result == Some(0) && r.msg_id.is_some() && r.report.is_some())
    }

    async fn submit_round_trip<P: ServerDialect>(record: ClientAuthRecord) {
        let (addr, server) = serve::<P>(local(), vec![record.clone()]).await;
        let tracker = Arc::new(Tracker::new());
        let session = connect::<P>(addr, &record, &tracker).await.unwrap();
        assert!(session.health());

        let phones = vec![PHONE.to_string()];
        let sequences = session.send(7, &phones, "hello", &MtOptions::default()).await.unwrap();
        assert_eq!(sequences.len(), 1);
        assert!(eventually(|| settled(tracker.by_sequence(&sequences[0]))).await);
        assert_eq!(tracker.query(7).map(|results| results.len()), Some(1));

        let logged_in = server.sessions();
        assert_eq!(logged_in.len(), 1);
        assert_eq!(logged_in[0].client_id().as_deref(), Some(record.client_id.as_str()));

        session.terminate().await;
        assert!(eventually(|| server.active() == 0).await);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn cmpp_submit_gets_response_and_report() {
        submit_round_trip::<Cmpp>(ClientAuthRecord::new(Isp::Cmpp, "901234", "secret", cmpp::V30)).await;
    }

    #[tokio::test]
    async fn cmpp2_submit_gets_response_and_report() {
        submit_round_trip::<Cmpp>(ClientAuthRecord::new(Isp::Cmpp, "901235", "secret", cmpp::V20)).await;
    }

    #[tokio::test]
    async fn sgip_submit_gets_response_and_report() {
        submit_round_trip::<Sgip>(ClientAuthRecord::new(Isp::Sgip, "sp01", "pwd", sgip::V12)).await;
    }

    #[tokio::test]
    async fn smgp_submit_gets_response_and_report() {
        submit_round_trip::<Smgp>(ClientAuthRecord::new(Isp::Smgp, "10010", "secret", smgp::V30)).await;
    }

    #[tokio::test]
    async fn long_text_is_segmented_and_every_part_answered() {
        let record = ClientAuthRecord::new(Isp::Smgp, "10010", "secret", smgp::V30);
        let (addr, server) = serve::<Smgp>(local(), vec![record.clone()]).await;
        let tracker = Arc::new(Tracker::new());
        let session = connect::<Smgp>(addr, &record, &tracker).await.unwrap();

        let text = "网关长短信分段测试".repeat(20);
        let phones = vec![PHONE.to_string()];
        let sequences = session.send(9, &phones, &text, &MtOptions::default()).await.unwrap();
        assert!(sequences.len() > 1);
        assert!(eventually(|| sequences.iter().all(|seq| settled(tracker.by_sequence(seq)))).await);
        assert_eq!(tracker.query(9).map(|results| results.len()), Some(sequences.len()));
        server.shutdown().await;
    }

    #[tokio::test]
    async fn wrong_secret_is_refused() {
        let record = ClientAuthRecord::new(Isp::Cmpp, "901234", "secret", cmpp::V30);
        let (addr, server) = serve::<Cmpp>(local(), vec![record.clone()]).await;

        let impostor = ClientAuthRecord::new(Isp::Cmpp, "901234", "guess", cmpp::V30);
        let result = connect::<Cmpp>(addr, &impostor, &Arc::new(Tracker::new())).await;
        assert!(matches!(result, Err(GatewayError::Protocol { status: 3, .. })));
        assert!(eventually(|| server.active() == 0).await);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn account_connection_limit_is_enforced() {
        let record = ClientAuthRecord::new(Isp::Smgp, "10010", "secret", smgp::V30).with_max_conns(1);
        let (addr, server) = serve::<Smgp>(local(), vec![record.clone()]).await;
        let tracker = Arc::new(Tracker::new());

        let first = connect::<Smgp>(addr, &record, &tracker).await.unwrap();
        let second = connect::<Smgp>(addr, &record, &tracker).await;
        assert!(matches!(second, Err(GatewayError::Protocol { status, .. }) if status == Smgp::TOO_MANY_CONNECTIONS));
        assert!(first.health());
        server.shutdown().await;
    }

    #[tokio::test]
    async fn server_session_cap_refuses_extra_connections() {
        let record = ClientAuthRecord::new(Isp::Cmpp, "901234", "secret", cmpp::V30).with_max_conns(5);
        let (addr, server) = serve::<Cmpp>(local().with_max_sessions(1), vec![record.clone()]).await;
        let tracker = Arc::new(Tracker::new());

        let _first = connect::<Cmpp>(addr, &record, &tracker).await.unwrap();
        assert!(connect::<Cmpp>(addr, &record, &tracker).await.is_err());
        assert_eq!(server.active(), 1);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn server_rate_limit_answers_flow_control_and_keeps_link() {
        let record = ClientAuthRecord::new(Isp::Cmpp, "901234", "secret", cmpp::V30)
            .with_window(1)
            .with_throughput(1);
        let (addr, server) = serve::<Cmpp>(local(), vec![record.clone()]).await;
        let tracker = Arc::new(Tracker::new());
        let session = connect::<Cmpp>(addr, &record, &tracker).await.unwrap();

        let phones = vec![PHONE.to_string()];
        for query_id in 1..=3 {
            session.send(query_id, &phones, "hi", &MtOptions::default()).await.unwrap();
        }
        let answered = |query_id| tracker.query(query_id).is_some_and(|r| r[0].result.is_some());
        assert!(eventually(|| (1..=3).all(|q| answered(q))).await);

        let codes: Vec<_> = (1..=3).filter_map(|q| tracker.query(q)).map(|r| r[0].result).collect();
        assert_eq!(codes[0], Some(0));
        assert!(codes.contains(&Some(Cmpp::FLOW_CONTROL)));
        assert!(session.health());
        server.shutdown().await;
    }

    #[tokio::test]
    async fn submits_beyond_the_window_get_flow_control_and_keep_link() {
        let record = ClientAuthRecord::new(Isp::Cmpp, "901234", "secret", cmpp::V30)
            .with_window(1)
            .with_throughput(10_000);
        let mock = MockConfig::default().with_response_delay(Duration::from_millis(200), Duration::from_millis(200));
        let (addr, server) = serve::<Cmpp>(local().with_mock(mock), vec![record.clone()]).await;
        let tracker = Arc::new(Tracker::new());
        let session = connect::<Cmpp>(addr, &record, &tracker).await.unwrap();

        let phones = vec![PHONE.to_string()];
        for query_id in 1..=5 {
            session.send(query_id, &phones, "hi", &MtOptions::default()).await.unwrap();
        }
        let server_session = server.sessions().pop().unwrap();
        let window = server_session.resources().unwrap().window;
        assert!(window.in_flight() <= 1);

        let answered = |query_id| tracker.query(query_id).is_some_and(|r| r[0].result.is_some());
        assert!(eventually(|| (1..=5).all(|q| answered(q))).await);

        let codes: Vec<_> = (1..=5).filter_map(|q| tracker.query(q)).map(|r| r[0].result).collect();
        assert_eq!(codes[0], Some(0));
        assert!(codes[1..].iter().all(|code| *code == Some(Cmpp::FLOW_CONTROL)));
        assert!(session.health());
        assert!(server_session.is_logged_in());
        assert_eq!(server.active(), 1);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn sgip_client_closes_idle_session() {
        let record = ClientAuthRecord::new(Isp::Sgip, "sp01", "pwd", sgip::V12);
        let (addr, server) = serve::<Sgip>(local(), vec![record.clone()]).await;
        let config = ClientConfig::default().with_heartbeat(
            HeartbeatConfig::new(Duration::from_millis(50))
                .with_force_close(Duration::from_millis(150))
                .with_close_grace(Duration::from_millis(50)),
        );
        let session = Session::<Sgip>::connect(
            &addr.to_string(),
            config,
            Arc::new(record),
            Arc::new(Sequences::default()),
            Arc::new(Tracker::new()),
            Window::new(16),
        )
        .await
        .unwrap();

        assert!(session.health_check().await);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!session.health_check().await);
        assert!(!session.health());
        assert!(eventually(|| server.active() == 0).await);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn busy_sender_to_silent_gateway_still_goes_idle() {
        let record = ClientAuthRecord::new(Isp::Cmpp, "901234", "secret", cmpp::V30);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Answers the login, then reads everything and never replies
        let gateway_record = record.clone();
        let gateway = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut conn = Connection::<Cmpp>::new(socket);
            let login = conn.read_frame(cmpp::V30).await.unwrap().unwrap();
            let response = Cmpp::login_response(&login, 0, Some(&gateway_record)).unwrap();
            conn.write_frame(&response).await.unwrap();
            let mut submits = 0;
            while let Ok(Some(frame)) = conn.read_frame(cmpp::V30).await {
                if matches!(frame, cmpp::Frame::Submit(_)) {
                    submits += 1;
                }
            }
            submits
        });

        let config = ClientConfig::default().with_heartbeat(
            HeartbeatConfig::new(Duration::from_secs(60))
                .with_force_close(Duration::from_millis(150))
                .with_close_grace(Duration::from_millis(50)),
        );
        let session = Session::<Cmpp>::connect(
            &addr.to_string(),
            config,
            Arc::new(record),
            Arc::new(Sequences::default()),
            Arc::new(Tracker::new()),
            Window::new(16),
        )
        .await
        .unwrap();

        let phones = vec![PHONE.to_string()];
        for query_id in 0..8 {
            session.send(query_id, &phones, "hi", &MtOptions::default()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        assert!(!session.health_check().await);
        assert!(!session.health());

        let submits = tokio::time::timeout(Duration::from_secs(2), gateway).await.unwrap().unwrap();
        assert_eq!(submits, 8);
    }

    #[tokio::test]
    async fn simulated_failures_get_no_report() {
        let record = ClientAuthRecord::new(Isp::Smgp, "10010", "secret", smgp::V30);
        let config = local().with_mock(MockConfig::default().with_success_rate(0.0));
        let (addr, server) = serve::<Smgp>(config, vec![record.clone()]).await;
        let tracker = Arc::new(Tracker::new());
        let session = connect::<Smgp>(addr, &record, &tracker).await.unwrap();

        let phones = vec![PHONE.to_string()];
        let sequences = session.send(1, &phones, "hi", &MtOptions::default()).await.unwrap();
        assert!(eventually(|| tracker.by_sequence(&sequences[0]).is_some_and(|r| r.result.is_some())).await);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let result = tracker.by_sequence(&sequences[0]).unwrap();
        assert_eq!(result.result, Some(Smgp::SUBMIT_FAILURE));
        assert!(result.msg_id.is_none());
        assert!(result.report.is_none());
        server.shutdown().await;
    }

    #[tokio::test]
    async fn idle_sessions_are_terminated() {
        let record = ClientAuthRecord::new(Isp::Cmpp, "901234", "secret", cmpp::V30);
        let config = local().with_tick_interval(Duration::from_millis(20)).with_heartbeat(
            HeartbeatConfig::new(Duration::from_secs(60))
                .with_force_close(Duration::from_millis(150))
                .with_close_grace(Duration::from_millis(100)),
        );
        let (addr, server) = serve::<Cmpp>(config, vec![record.clone()]).await;
        let session = connect::<Cmpp>(addr, &record, &Arc::new(Tracker::new())).await.unwrap();

        assert!(eventually(|| !session.health()).await);
        assert!(eventually(|| server.active() == 0).await);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn silent_peer_is_dropped_after_missed_heartbeats() {
        let record = ClientAuthRecord::new(Isp::Cmpp, "901234", "secret", cmpp::V30);
        let config = local().with_tick_interval(Duration::from_millis(10)).with_heartbeat(
            HeartbeatConfig::new(Duration::from_millis(40))
                .with_max_missed(3)
                .with_close_grace(Duration::from_millis(50)),
        );
        let (addr, server) = serve::<Cmpp>(config, vec![record.clone()]).await;

        // Log in by hand, then read without ever answering
        let socket = tokio::net::TcpStream::connect(addr).await.unwrap();
        let mut conn = Connection::<Cmpp>::new(socket);
        let seqs = Sequences::default();
        conn.write_frame(&Cmpp::login_frame(&record, &seqs)).await.unwrap();
        let response = conn.read_frame(cmpp::V30).await.unwrap().unwrap();
        assert!(Cmpp::check_login_response(&response, &record).is_ok());

        let mut probes = 0;
        let mut terminated = false;
        let drained = tokio::time::timeout(Duration::from_secs(3), async {
            while let Ok(Some(frame)) = conn.read_frame(cmpp::V30).await {
                match frame {
                    cmpp::Frame::ActiveTest(_) => probes += 1,
                    cmpp::Frame::Terminate(_) => terminated = true,
                    _ => {}
                }
            }
        })
        .await;

        assert!(drained.is_ok());
        assert_eq!(probes, 3);
        assert!(terminated);
        assert!(eventually(|| server.active() == 0).await);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn requests_before_login_drop_the_connection() {
        let record = ClientAuthRecord::new(Isp::Smgp, "10010", "secret", smgp::V30);
        let (addr, server) = serve::<Smgp>(local(), vec![record]).await;

        let socket = tokio::net::TcpStream::connect(addr).await.unwrap();
        let mut conn = Connection::<Smgp>::new(socket);
        let seqs = Sequences::default();
        if let Some(probe) = Smgp::active_test(&seqs) {
            conn.write_frame(&probe).await.unwrap();
        }
        let read = tokio::time::timeout(Duration::from_secs(2), conn.read_frame(smgp::V30)).await;
        assert!(matches!(read, Ok(Ok(None)) | Ok(Err(_))));
        assert!(eventually(|| server.active() == 0).await);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn factory_prefers_least_used_session() {
        let record = ClientAuthRecord::new(Isp::Cmpp, "901234", "secret", cmpp::V30).with_max_conns(2);
        let (addr, server) = serve::<Cmpp>(local(), vec![record.clone()]).await;

        let factory = SessionFactory::<Cmpp>::new(
            FactoryConfig::new(Isp::Cmpp, "901234", addr.to_string(), "^1"),
            Arc::new(record),
            Arc::new(Sequences::default()),
            Arc::new(Tracker::new()),
        );
        factory.resort().await;
        factory.resort().await;
        assert_eq!(factory.sessions().len(), 2);

        let first = factory.peek().unwrap();
        let phones = vec![PHONE.to_string()];
        factory.send(1, &phones, "hi", &MtOptions::default()).await.unwrap();
        let second = factory.peek().unwrap();
        assert_ne!(first.id(), second.id());
        assert!(first.lru_priority() < second.lru_priority());

        factory.close().await;
        assert!(factory.peek().is_none());
        server.shutdown().await;
    }

    #[tokio::test]
    async fn client_window_bounds_in_flight_submits() {
        let record = ClientAuthRecord::new(Isp::Cmpp, "901234", "secret", cmpp::V30).with_throughput(10_000);
        let mock = MockConfig::default().with_response_delay(Duration::from_millis(30), Duration::from_millis(30));
        let (addr, server) = serve::<Cmpp>(local().with_mock(mock), vec![record.clone()]).await;
        let tracker = Arc::new(Tracker::new());
        let window = Window::new(2);
        let session = Session::<Cmpp>::connect(
            &addr.to_string(),
            ClientConfig::default(),
            Arc::new(record),
            Arc::new(Sequences::default()),
            Arc::clone(&tracker),
            window.clone(),
        )
        .await
        .unwrap();

        let mut sends = Vec::new();
        for query_id in 0..6 {
            let session = Arc::clone(&session);
            sends.push(tokio::spawn(async move {
                let phones = vec![PHONE.to_string()];
                session.send(query_id, &phones, "hi", &MtOptions::default()).await
            }));
        }
        for _ in 0..20 {
            assert!(window.in_flight() <= 2);
            assert!(session.in_flight() <= 2);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        for send in sends {
            send.await.unwrap().unwrap();
        }
        assert!(eventually(|| (0..6).all(|q| tracker.query(q).is_some_and(|r| r[0].result == Some(0)))).await);
        assert!(eventually(|| window.in_flight() == 0).await);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn gateway_sweeps_expired_results_into_sink() {
        let record = ClientAuthRecord::new(Isp::Sgip, "sp01", "pwd", sgip::V12);
        let (addr, server) = serve::<Sgip>(local(), vec![record.clone()]).await;
        let store: MemoryAuthStore = [record].into_iter().collect();
        let sink = Arc::new(MemorySink::new());

        let gateway = Gateway::builder(
            GatewayConfig::default()
                .with_tracking_ttl(Duration::from_millis(200))
                .with_sweep_interval(Duration::from_millis(20)),
        )
        .sink(Arc::clone(&sink) as Arc<dyn ResultSink>)
        .route(FactoryConfig::new(Isp::Sgip, "sp01", addr.to_string(), r"^1(3[0-2]|5[56]|8[56])"), &store)
        .unwrap()
        .build();
        gateway.start();

        let query_id = gateway.send(&["13012345678"], "hi", &MtOptions::default()).await.unwrap();
        assert!(eventually(|| gateway.query(query_id).is_some_and(|r| settled(r.into_iter().next()))).await);
        assert!(eventually(|| sink.total() == 1).await);
        assert!(gateway.query(query_id).is_none());
        assert!(gateway.tracker().is_empty());

        gateway.shutdown().await;
        server.shutdown().await;
    }

    #[tokio::test]
    async fn server_session_close_is_idempotent() {
        use crate::connection::{FrameWriter, SharedWriter};
        use crate::server::ServerSession;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(tokio::net::TcpStream::connect(addr), listener.accept());
        let _client = client.unwrap();
        let (socket, peer) = accepted.unwrap();
        let (_read, write) = socket.into_split();

        let session = ServerSession::<Cmpp>::new(1, Some(peer), SharedWriter::new(FrameWriter::new(write)), HeartbeatConfig::default());
        assert!(session.resources().is_err());

        let record = Arc::new(ClientAuthRecord::new(Isp::Cmpp, "901234", "secret", cmpp::V30));
        assert!(session.complete_login(Arc::clone(&record), cmpp::V30));
        assert!(session.is_logged_in());
        let resources = session.resources().unwrap();
        assert_eq!(resources.window.capacity(), usize::from(record.mt_window_size));

        session.close().await;
        session.close().await;
        assert!(session.is_closed());
        assert!(session.client().is_none());
        assert!(resources.window.is_closed());
        assert!(!session.complete_login(record, cmpp::V30));

        let probe = Cmpp::active_test(&Sequences::default()).unwrap();
        assert!(matches!(session.send(&probe).await, Err(GatewayError::ConnectionClosed)));
    }
}
