// ABOUTME: Demo mock operator gateway for load and integration testing of SP clients
// ABOUTME: Serves one protocol on one port with configurable success rate, delays, reports and MO traffic

use argh::FromArgs;
use smsgate::auth::{ClientAuthRecord, Isp, MemoryAuthStore};
use smsgate::cmpp::Cmpp;
use smsgate::server::{MockConfig, Server, ServerConfig, ServerDialect};
use smsgate::sgip::Sgip;
use smsgate::smgp::Smgp;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

/// Pretend to be a CMPP, SGIP or SMGP operator gateway
#[derive(FromArgs)]
struct CliArgs {
    /// enable debug logging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// protocol: cmpp, sgip or smgp (default: cmpp)
    #[argh(option, default = "Isp::Cmpp")]
    isp: Isp,

    /// listen address (default: 0.0.0.0:7890)
    #[argh(option, default = "String::from(\"0.0.0.0:7890\")")]
    listen: String,

    /// accounts as client_id:secret:version, comma separated
    #[argh(option)]
    accounts: String,

    /// connections each account may hold (default: 2)
    #[argh(option, default = "2")]
    max_conns: u16,

    /// submits per second each session may send (default: 100)
    #[argh(option, default = "100")]
    throughput: u32,

    /// share of submits answered with success (default: 1.0)
    #[argh(option, default = "1.0")]
    success_rate: f64,

    /// lower bound of the response delay in milliseconds (default: 0)
    #[argh(option, default = "0")]
    min_delay_ms: u64,

    /// upper bound of the response delay in milliseconds (default: 0)
    #[argh(option, default = "0")]
    max_delay_ms: u64,

    /// delay between a response and its status report in milliseconds (default: 100)
    #[argh(option, default = "100")]
    report_delay_ms: u64,

    /// chance per session and tick of an MO message (default: 0, off)
    #[argh(option, default = "0.0")]
    mo_rate: f64,

    /// MO entries as sub_no_,_text, separated by ';'
    #[argh(option, default = "String::from(\"01_,_TD\")")]
    mo_contents: String,
}

fn parse_accounts(isp: Isp, cli_args: &CliArgs) -> smsgate::Result<MemoryAuthStore> {
    let store = MemoryAuthStore::new();
    for account in cli_args.accounts.split(',').filter(|a| !a.is_empty()) {
        let mut fields = account.split(':');
        let (Some(client_id), Some(secret), Some(version)) = (fields.next(), fields.next(), fields.next()) else {
            return Err(format!("bad account {account:?}, expected client_id:secret:version").into());
        };
        let version = parse_version(version)?;
        store.insert(
            ClientAuthRecord::new(isp, client_id, secret, version)
                .with_max_conns(cli_args.max_conns)
                .with_throughput(cli_args.throughput),
        );
    }
    Ok(store)
}

/// Accepts `48` as well as `0x30`
fn parse_version(version: &str) -> smsgate::Result<u8> {
    Ok(match version.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16)?,
        None => version.parse()?,
    })
}

async fn serve<P: ServerDialect>(config: ServerConfig, store: MemoryAuthStore) -> smsgate::Result<()> {
    let server = Server::<P>::bind(config, Arc::new(store)).await?;
    let handle = server.handle();
    info!(addr = %server.local_addr()?, "mock gateway ready");

    let running = tokio::spawn(server.run());
    tokio::signal::ctrl_c().await?;
    handle.shutdown().await;
    running.await?;
    Ok(())
}

#[tokio::main]
async fn main() -> smsgate::Result<()> {
    let cli_args: CliArgs = argh::from_env();

    let level = if cli_args.debugging { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let store = parse_accounts(cli_args.isp, &cli_args)?;
    let mut mock = MockConfig::default()
        .with_success_rate(cli_args.success_rate)
        .with_response_delay(
            Duration::from_millis(cli_args.min_delay_ms),
            Duration::from_millis(cli_args.max_delay_ms),
        )
        .with_report(1.0, Duration::from_millis(cli_args.report_delay_ms));
    if cli_args.mo_rate > 0.0 {
        let contents = cli_args.mo_contents.split(';').map(str::to_string).collect();
        mock = mock.with_mo(cli_args.mo_rate, contents);
    }
    let config = ServerConfig::new(&cli_args.listen).with_mock(mock);

    match cli_args.isp {
        Isp::Cmpp => serve::<Cmpp>(config, store).await,
        Isp::Sgip => serve::<Sgip>(config, store).await,
        Isp::Smgp => serve::<Smgp>(config, store).await,
    }
}
