//! Demonstration objects: a calculator and the object-server test object.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use busline_core::Value;
use tracing::debug;

use crate::error::BusError;
use crate::handler::{CallContext, NestedCall, NestedResult, Step};
use crate::method::decode_args;
use crate::server::ObjectServer;

pub const CALCULATOR_SERVICE: &str = "xyz.openbmc_project.Calculator";
pub const CALCULATOR_PATH: &str = "/calculator";
pub const CALCULATOR_INTERFACE: &str = "xyz.openbmc_project.Calculator";
pub const CALCULATOR_STATUS: &str = "xyz.openbmc_project.Calculator.State.Success";
pub const DIVISION_BY_ZERO: &str = "xyz.openbmc_project.Calculator.Error.DivisionByZero";
pub const OVERFLOW: &str = "xyz.openbmc_project.Calculator.Error.Overflow";

pub const TEST_SERVICE: &str = "xyz.openbmc_project.asio-test";
pub const TEST_PATH: &str = "/xyz/openbmc_project/test";
pub const TEST_INTERFACE: &str = "xyz.openbmc_project.test";

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Declares and publishes the calculator on `server`.
///
/// # Errors
///
/// Any registration error.
pub fn register_calculator(server: &mut ObjectServer) -> Result<(), BusError> {
    server.add_interface(CALCULATOR_PATH, CALCULATOR_INTERFACE, |b| {
        b.property("LastResult", 0_i64)
            .read_write()
            .emits_change()
            .register()?;
        b.property("Status", CALCULATOR_STATUS.to_string())
            .no_notify()
            .register()?;

        b.method("Multiply", |ctx, (x, y): (i64, i64)| {
            let product = x
                .checked_mul(y)
                .ok_or_else(|| BusError::domain(OVERFLOW, format!("{x} * {y} overflows")))?;
            ctx.set_property("LastResult", product)?;
            Ok(product)
        })?;
        b.method("Divide", |ctx, (x, y): (i64, i64)| {
            if y == 0 {
                return Err(BusError::domain(
                    DIVISION_BY_ZERO,
                    format!("cannot divide {x} by zero"),
                ));
            }
            let quotient = x
                .checked_div(y)
                .ok_or_else(|| BusError::domain(OVERFLOW, format!("{x} / {y} overflows")))?;
            ctx.set_property("LastResult", quotient)?;
            Ok(quotient)
        })?;
        b.method("Clear", |ctx, (): ()| {
            let old: i64 = ctx.property_as("LastResult")?;
            ctx.set_property("LastResult", 0_i64)?;
            ctx.emit("Cleared", (old,))?;
            Ok(())
        })?;
        b.signal::<(i64,)>("Cleared")?;
        Ok(())
    })?;
    server.initialize(CALCULATOR_PATH)
}

// ---------------------------------------------------------------------------
// Test object
// ---------------------------------------------------------------------------

/// Declares and publishes the test object. `service` is the bus name
/// `TestYieldFunction` calls back into.
///
/// # Errors
///
/// Any registration error.
pub fn register_test_object(server: &mut ObjectServer, service: &str) -> Result<(), BusError> {
    let service = service.to_string();
    server.add_interface(TEST_PATH, TEST_INTERFACE, move |b| {
        b.property("int", 33_i32).read_write().register()?;
        b.property("myStringVec", strings(&["some", "test", "data"]))
            .read_write()
            .register()?;
        b.property("myStringVec2", strings(&["more", "test", "data"]))
            .register()?;
        b.property("lessThan50", 23_i32)
            .read_write()
            .setter(|requested, current| {
                if *requested >= 50 {
                    return false;
                }
                *current = *requested;
                true
            })
            .register()?;
        b.property("TrailTime", "foo".to_string())
            .read_write()
            .getter(|stored| format!("{stored} {}", unix_seconds()))
            .register()?;

        b.method("TestMethod", |_ctx, (count,): (i32,)| {
            Ok((count, format!("success: {count}")))
        })?;
        b.method("TestFunction", |_ctx, (value,): (i32,)| Ok(value.wrapping_add(1)))?;
        b.suspending_method("TestYieldFunction", move |_ctx, (value,): (i32,)| {
            let call = NestedCall::new(&service, TEST_PATH, TEST_INTERFACE, "TestFunction")
                .args((value,));
            Step::suspend(call, move |_ctx: &mut CallContext<'_>, result: NestedResult| {
                let expected = value.wrapping_add(1);
                match result.and_then(|args| decode_args::<(i32,)>("TestFunction", args)) {
                    Ok((count,)) if count == expected => Step::done(count),
                    Ok((count,)) => {
                        debug!(value, count, "TestFunction returned an unexpected count");
                        Step::done(-1)
                    }
                    Err(e) => {
                        debug!(value, error = %e, "nested TestFunction failed");
                        Step::done(-1)
                    }
                }
            })
        })?;
        b.method("TestMethodWithMessage", |ctx, (value,): (i32,)| {
            debug!(sender = %ctx.sender(), serial = ctx.serial(), value, "call with message");
            Ok(value.wrapping_add(1))
        })?;
        b.method("VoidFunctionReturnsInt", |_ctx, (): ()| Ok(42_i32))?;
        b.method(
            "execute",
            |_ctx,
             (net_fn, lun, cmd, _data, _options): (
                u8,
                u8,
                u8,
                Vec<u8>,
                BTreeMap<String, Value>,
            )| {
                let completion_code = 0_u8;
                Ok((
                    net_fn.wrapping_add(1),
                    lun,
                    cmd,
                    completion_code,
                    vec![1_u8, 2, 3, 4],
                ))
            },
        )?;
        Ok(())
    })?;
    server.initialize(TEST_PATH)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
