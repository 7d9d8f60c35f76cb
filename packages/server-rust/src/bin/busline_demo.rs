//! Runs the calculator and the test object on an in-process bus and
//! drives them with a client.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use busline_core::message::standard;
use busline_server::demo::{
    register_calculator, register_test_object, CALCULATOR_INTERFACE, CALCULATOR_PATH,
    CALCULATOR_SERVICE, TEST_INTERFACE, TEST_PATH, TEST_SERVICE,
};
use busline_server::{
    init_tracing, BusConfig, BusError, LogFormat, LoopbackBus, LoopbackClient, ObjectServer,
    ServerConfig,
};
use clap::Parser;
use tracing::{error, info, warn};

/// Busline demo: calculator and test object over a loopback bus.
#[derive(Parser, Debug)]
#[command(name = "busline-demo")]
#[command(version, about, long_about = None)]
struct Args {
    /// Well-known name the test object is served under.
    #[arg(long, env = "BUSLINE_SERVICE_NAME", default_value = TEST_SERVICE)]
    service_name: String,

    /// Default timeout for nested calls, in milliseconds.
    #[arg(long, env = "BUSLINE_NESTED_TIMEOUT_MS", default_value_t = 25_000)]
    nested_timeout_ms: u64,

    /// Log output format: pretty or json.
    #[arg(long, env = "BUSLINE_LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,

    /// Per-connection inbox capacity of the loopback bus.
    #[arg(long, default_value_t = 256)]
    inbox_capacity: usize,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format)?;

    let bus = LoopbackBus::new(BusConfig {
        inbox_capacity: args.inbox_capacity,
    });
    let (connection, inbox) = bus.connect();
    let config = ServerConfig {
        nested_call_timeout_ms: args.nested_timeout_ms,
        ..ServerConfig::default()
    };
    let drain_timeout = config.drain_timeout();
    let server = match bring_up(ObjectServer::new(Arc::new(connection), config), &args.service_name) {
        Ok(server) => server,
        Err(err) if err.is_registration_error() => {
            error!(error = %err, "server setup rejected");
            return Err(err).context("declaring objects");
        }
        Err(err) => return Err(err.into()),
    };

    let shutdown = server.shutdown_handle();
    let reactor = tokio::spawn(server.run(inbox));

    let mut client = LoopbackClient::connect(&bus);
    run_scenario(&mut client, &args.service_name).await?;

    shutdown.trigger_shutdown();
    if !shutdown.wait_for_stop(drain_timeout + Duration::from_secs(1)).await {
        warn!(?drain_timeout, "reactor still draining after the drain timeout");
    }
    let server = reactor.await.context("reactor task failed")?;
    info!(in_flight = server.in_flight(), "demo finished");
    Ok(())
}

/// Claims both names and declares both objects.
fn bring_up(mut server: ObjectServer, service: &str) -> Result<ObjectServer, BusError> {
    server.request_name(CALCULATOR_SERVICE)?;
    server.request_name(service)?;
    register_calculator(&mut server)?;
    register_test_object(&mut server, service)?;
    Ok(server)
}

async fn run_scenario(client: &mut LoopbackClient, service: &str) -> anyhow::Result<()> {
    let (product,): (i64,) = client
        .call_method(CALCULATOR_SERVICE, CALCULATOR_PATH, CALCULATOR_INTERFACE, "Multiply", (6_i64, 7_i64))
        .await?;
    info!(product, "Multiply(6, 7)");

    match client
        .call_method::<_, (i64,)>(CALCULATOR_SERVICE, CALCULATOR_PATH, CALCULATOR_INTERFACE, "Divide", (5_i64, 0_i64))
        .await
    {
        Err(BusError::Domain { name, message }) => info!(error = %name, %message, "Divide(5, 0)"),
        other => warn!(result = ?other, "Divide(5, 0) did not fail as expected"),
    }

    client.take_signals();
    client
        .set_property(CALCULATOR_SERVICE, CALCULATOR_PATH, CALCULATOR_INTERFACE, "LastResult", 10_i64)
        .await?;
    let last: i64 = client
        .get_property(CALCULATOR_SERVICE, CALCULATOR_PATH, CALCULATOR_INTERFACE, "LastResult")
        .await?;
    let changes = client
        .take_signals()
        .iter()
        .filter(|s| s.member == standard::PROPERTIES_CHANGED)
        .count();
    info!(last, changes, "LastResult set to 10");

    let (yielded,): (i32,) = client
        .call_method(service, TEST_PATH, TEST_INTERFACE, "TestYieldFunction", (41_i32,))
        .await?;
    info!(yielded, "TestYieldFunction(41)");

    if let Some(signal) = client.next_signal(Duration::from_millis(10)).await {
        info!(member = %signal.member, "late signal");
    }
    Ok(())
}
