// ABOUTME: Demo client: logs in to one operator gateway and sends a message through the routing gateway
// ABOUTME: Waits for the submit responses and status reports, then prints the tracked results

use argh::FromArgs;
use smsgate::auth::{ClientAuthRecord, Isp, MemoryAuthStore};
use smsgate::client::{FactoryConfig, Gateway, GatewayConfig};
use smsgate::datatypes::MtOptions;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Send an SMS through a CMPP, SGIP or SMGP gateway
#[derive(FromArgs)]
struct CliArgs {
    /// enable debug logging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// protocol: cmpp, sgip or smgp (default: cmpp)
    #[argh(option, default = "Isp::Cmpp")]
    isp: Isp,

    /// gateway host (default: localhost)
    #[argh(option, default = "String::from(\"localhost\")")]
    host: String,

    /// gateway port (default: 7890)
    #[argh(option, short = 'p', default = "7890")]
    port: u16,

    /// account name
    #[argh(option)]
    client_id: String,

    /// shared secret or password
    #[argh(option)]
    secret: String,

    /// protocol version byte, e.g. 48 for CMPP 3.0 (default: the newest for the protocol)
    #[argh(option)]
    version: Option<u8>,

    /// SP display number the message is sent from
    #[argh(option, short = 'f', default = "String::new()")]
    from: String,

    /// recipient phone numbers, comma separated
    #[argh(option, short = 't')]
    to: String,

    /// the message to send
    #[argh(option, short = 'm')]
    message: String,

    /// seconds to wait for status reports (default: 5)
    #[argh(option, default = "5")]
    wait: u64,
}

fn newest_version(isp: Isp) -> u8 {
    match isp {
        Isp::Cmpp => smsgate::cmpp::V30,
        Isp::Sgip => smsgate::sgip::V12,
        Isp::Smgp => smsgate::smgp::V30,
    }
}

#[tokio::main]
async fn main() -> smsgate::Result<()> {
    let cli_args: CliArgs = argh::from_env();

    let level = if cli_args.debugging { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let version = cli_args.version.unwrap_or_else(|| newest_version(cli_args.isp));
    let record = ClientAuthRecord::new(cli_args.isp, &cli_args.client_id, &cli_args.secret, version)
        .with_display_no(&cli_args.from);
    let store: MemoryAuthStore = [record].into_iter().collect();

    let addr = format!("{}:{}", cli_args.host, cli_args.port);
    let gateway = Gateway::builder(GatewayConfig::default())
        .route(FactoryConfig::new(cli_args.isp, &cli_args.client_id, addr, "^"), &store)?
        .build();
    gateway.start();

    let phones: Vec<&str> = cli_args.to.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
    let query_id = gateway.send(&phones, &cli_args.message, &MtOptions::default()).await?;
    println!("Submitted under query id {query_id}");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(cli_args.wait);
    while tokio::time::Instant::now() < deadline {
        let done = gateway
            .query(query_id)
            .is_some_and(|results| results.iter().all(|r| r.report.is_some() || r.result.is_some_and(|c| c != 0)));
        if done {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    for result in gateway.query(query_id).unwrap_or_default() {
        println!(
            "{} seq={} result={:?} msg_id={:?} report={:?}",
            result.phone, result.sequence, result.result, result.msg_id, result.report
        );
    }

    gateway.shutdown().await;
    Ok(())
}
