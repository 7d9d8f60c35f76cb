//! Calculator and standard interfaces, end to end over the loopback bus.

use std::collections::BTreeMap;
use std::sync::Arc;

use busline_core::message::standard;
use busline_core::Value;
use busline_server::demo::{
    register_calculator, CALCULATOR_INTERFACE, CALCULATOR_PATH, CALCULATOR_SERVICE,
    CALCULATOR_STATUS, DIVISION_BY_ZERO,
};
use busline_server::{
    BusError, LoopbackBus, LoopbackClient, ObjectServer, ServerConfig,
    ShutdownController,
};
use tokio::task::JoinHandle;

struct Harness {
    bus: LoopbackBus,
    shutdown: Arc<ShutdownController>,
    reactor: JoinHandle<ObjectServer>,
}

impl Harness {
    fn start() -> Self {
        let bus = LoopbackBus::default();
        let (connection, inbox) = bus.connect();
        let mut server = ObjectServer::new(Arc::new(connection), ServerConfig::default());
        server.request_name(CALCULATOR_SERVICE).unwrap();
        register_calculator(&mut server).unwrap();
        let shutdown = server.shutdown_handle();
        let reactor = tokio::spawn(server.run(inbox));
        Self {
            bus,
            shutdown,
            reactor,
        }
    }

    fn client(&self) -> LoopbackClient {
        LoopbackClient::connect(&self.bus)
    }

    async fn stop(self) -> ObjectServer {
        self.shutdown.trigger_shutdown();
        self.reactor.await.unwrap()
    }
}

async fn calc<R: busline_core::FromArgs>(
    client: &mut LoopbackClient,
    member: &str,
    args: (i64, i64),
) -> Result<R, BusError> {
    client
        .call_method(CALCULATOR_SERVICE, CALCULATOR_PATH, CALCULATOR_INTERFACE, member, args)
        .await
}

fn properties_changed(client: &mut LoopbackClient) -> Vec<busline_core::Signal> {
    client
        .take_signals()
        .into_iter()
        .filter(|s| s.interface == standard::PROPERTIES && s.member == standard::PROPERTIES_CHANGED)
        .collect()
}

#[tokio::test]
async fn multiply_divide_and_last_result() {
    let harness = Harness::start();
    let mut client = harness.client();

    let (product,): (i64,) = calc(&mut client, "Multiply", (6, 7)).await.unwrap();
    assert_eq!(product, 42);

    let err = calc::<(i64,)>(&mut client, "Divide", (5, 0)).await.unwrap_err();
    assert_eq!(err.error_name(), DIVISION_BY_ZERO);

    client.take_signals();
    client
        .set_property(CALCULATOR_SERVICE, CALCULATOR_PATH, CALCULATOR_INTERFACE, "LastResult", 10_i64)
        .await
        .unwrap();
    let last: i64 = client
        .get_property(CALCULATOR_SERVICE, CALCULATOR_PATH, CALCULATOR_INTERFACE, "LastResult")
        .await
        .unwrap();
    assert_eq!(last, 10);

    let changes = properties_changed(&mut client);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].path, CALCULATOR_PATH);
    assert_eq!(changes[0].args[0], Value::String(CALCULATOR_INTERFACE.into()));
    let Value::Dict { entries, .. } = &changes[0].args[1] else {
        panic!("expected a{{sv}}");
    };
    assert_eq!(
        entries,
        &vec![(Value::String("LastResult".into()), Value::Int64(10).into_variant())]
    );

    harness.stop().await;
}

#[tokio::test]
async fn read_only_status_is_unchanged_after_set() {
    let harness = Harness::start();
    let mut client = harness.client();

    let err = client
        .set_property(CALCULATOR_SERVICE, CALCULATOR_PATH, CALCULATOR_INTERFACE, "Status", "hacked".to_string())
        .await
        .unwrap_err();
    assert_eq!(err.error_name(), standard::ERROR_PROPERTY_READ_ONLY);

    let status: String = client
        .get_property(CALCULATOR_SERVICE, CALCULATOR_PATH, CALCULATOR_INTERFACE, "Status")
        .await
        .unwrap();
    assert_eq!(status, CALCULATOR_STATUS);
    assert!(properties_changed(&mut client).is_empty());

    harness.stop().await;
}

#[tokio::test]
async fn clear_reports_old_value() {
    let harness = Harness::start();
    let mut client = harness.client();

    let _: (i64,) = calc(&mut client, "Multiply", (3, 5)).await.unwrap();
    client.take_signals();
    let (): () = client
        .call_method(CALCULATOR_SERVICE, CALCULATOR_PATH, CALCULATOR_INTERFACE, "Clear", ())
        .await
        .unwrap();

    let cleared: Vec<_> = client
        .take_signals()
        .into_iter()
        .filter(|s| s.interface == CALCULATOR_INTERFACE)
        .collect();
    assert_eq!(cleared.len(), 1);
    assert_eq!(cleared[0].member, "Cleared");
    assert_eq!(cleared[0].args, vec![Value::Int64(15)]);

    harness.stop().await;
}

#[tokio::test]
async fn dispatch_errors_reach_the_caller() {
    let harness = Harness::start();
    let mut client = harness.client();

    let err = client
        .call(CALCULATOR_SERVICE, CALCULATOR_PATH, CALCULATOR_INTERFACE, "Multiply", vec![Value::Int32(6)])
        .await
        .unwrap_err();
    assert_eq!(err.error_name(), standard::ERROR_INVALID_ARGS);

    let err = client
        .call(CALCULATOR_SERVICE, CALCULATOR_PATH, CALCULATOR_INTERFACE, "Power", vec![])
        .await
        .unwrap_err();
    assert_eq!(err.error_name(), standard::ERROR_UNKNOWN_METHOD);

    let err = client
        .call(CALCULATOR_SERVICE, "/abacus", CALCULATOR_INTERFACE, "Multiply", vec![])
        .await
        .unwrap_err();
    assert_eq!(err.error_name(), standard::ERROR_UNKNOWN_OBJECT);

    let err = client
        .call(CALCULATOR_SERVICE, CALCULATOR_PATH, "xyz.Abacus", "Multiply", vec![])
        .await
        .unwrap_err();
    assert_eq!(err.error_name(), standard::ERROR_UNKNOWN_INTERFACE);

    let err = client
        .call("xyz.nobody", CALCULATOR_PATH, CALCULATOR_INTERFACE, "Multiply", vec![])
        .await
        .unwrap_err();
    assert_eq!(err.error_name(), standard::ERROR_SERVICE_UNKNOWN);

    // The server keeps serving after errors.
    let (product,): (i64,) = calc(&mut client, "Multiply", (2, 2)).await.unwrap();
    assert_eq!(product, 4);

    harness.stop().await;
}

#[tokio::test]
async fn standard_interfaces() {
    let harness = Harness::start();
    let mut client = harness.client();

    let (all,): (BTreeMap<String, Value>,) = client
        .call_method(CALCULATOR_SERVICE, CALCULATOR_PATH, standard::PROPERTIES, "GetAll", (CALCULATOR_INTERFACE,))
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all["Status"], Value::String(CALCULATOR_STATUS.into()));
    assert_eq!(all["LastResult"], Value::Int64(0));

    let (xml,): (String,) = client
        .call_method(CALCULATOR_SERVICE, CALCULATOR_PATH, standard::INTROSPECTABLE, "Introspect", ())
        .await
        .unwrap();
    assert!(xml.contains("<method name=\"Divide\">"));
    assert!(xml.contains("<signal name=\"Cleared\">"));

    let (root,): (String,) = client
        .call_method(CALCULATOR_SERVICE, "/", standard::INTROSPECTABLE, "Introspect", ())
        .await
        .unwrap();
    assert!(root.contains("<node name=\"calculator\"/>"));

    let (): () = client
        .call_method(CALCULATOR_SERVICE, CALCULATOR_PATH, standard::PEER, "Ping", ())
        .await
        .unwrap();
    let (id,): (String,) = client
        .call_method(CALCULATOR_SERVICE, CALCULATOR_PATH, standard::PEER, "GetMachineId", ())
        .await
        .unwrap();
    assert_eq!(id.len(), 32);

    harness.stop().await;
}

#[tokio::test]
async fn second_server_cannot_take_the_name() {
    let harness = Harness::start();
    let (connection, _inbox) = harness.bus.connect();
    let rival = ObjectServer::new(Arc::new(connection), ServerConfig::default());
    let err = rival.request_name(CALCULATOR_SERVICE).unwrap_err();
    assert!(err.is_registration_error());
    assert!(matches!(err, BusError::NameTaken { .. }));
    assert!(rival.unique_name().starts_with(":1."));

    let server = harness.stop().await;
    assert_eq!(server.in_flight(), 0);
}
