// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus server publishing the RGA process variables
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module uses
//! the terms "server" and "client" instead. The server is the device that provides data,
//! while the client is the device that requests data.
//!
//! ## Register Map
//!
//! With `n` channels:
//!
//! ### Input Registers (Read Only)
//!
//! | Register Address | Description | Encoding |
//! |-----------------|-------------|----------|
//! | 2i, 2i+1 | Reading of channel MID(i+1) | f32, high word first |
//! | 2n+2i, 2n+2i+1 | Mass of channel MID(i+1) | f32, high word first |
//! | 4n | Status code | 0=idle, 1=running, 2=error |
//! | 4n+1 | Last reading timestamp (Low Word) | epoch seconds |
//! | 4n+2 | Last reading timestamp (High Word) | epoch seconds |
//!
//! Both timestamp words stay 0 until a reading has been written.
//!
//! ### Holding Registers (Read/Write)
//!
//! | Register Address | Description |
//! |-----------------|-------------|
//! | 0 | OpenExp: write 1 to open the experiment |
//! | 1 | Acquire: 1 starts, 0 stops the acquisition |
//!
//! Holding register writes are puts on the matching PV, so they trigger the
//! same actions as any other client of the PV database.

use std::{
    collections::HashMap,
    future,
    sync::{Arc, Mutex, PoisonError},
};

use log::{debug, error};
use tokio_modbus::prelude::*;

use crate::ioc::rga::{RgaPvNames, STATUS_ERROR_PREFIX, STATUS_RUNNING};
use crate::ioc::{PvDatabase, PvValue};

pub const OPEN_EXP_REGISTER: u16 = 0;
pub const ACQUIRE_REGISTER: u16 = 1;

/// A Modbus TCP server backed by the PV database.
///
/// Input registers are rebuilt from the PVs before every read, holding
/// registers mirror the `OpenExp` and `Acquire` PVs.
pub struct RgaModbusServer {
    db: Arc<PvDatabase>,
    names: Arc<RgaPvNames>,

    /// Input registers (read-only channel values and status)
    pub input_registers: Arc<Mutex<HashMap<u16, u16>>>,

    /// Holding registers (control PVs)
    pub holding_registers: Arc<Mutex<HashMap<u16, u16>>>,
}

impl tokio_modbus::server::Service for RgaModbusServer {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    /// Process a Modbus request and provide a response
    ///
    /// This method handles different Modbus function codes:
    /// - 0x04: Read Input Registers
    /// - 0x03: Read Holding Registers
    /// - 0x10: Write Multiple Registers
    /// - 0x06: Write Single Register
    ///
    /// Any other function code will return an IllegalFunction exception.
    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("Received Modbus request: {:?}", req);

        let res = match req {
            Request::ReadInputRegisters(addr, cnt) => {
                self.refresh_input_registers();
                register_read(&lock(&self.input_registers), addr, cnt)
                    .map(Response::ReadInputRegisters)
            }
            Request::ReadHoldingRegisters(addr, cnt) => {
                self.refresh_holding_registers();
                register_read(&lock(&self.holding_registers), addr, cnt)
                    .map(Response::ReadHoldingRegisters)
            }
            Request::WriteMultipleRegisters(addr, values) => self
                .write_holding(addr, &values)
                .map(|_| Response::WriteMultipleRegisters(addr, values.len() as u16)),
            Request::WriteSingleRegister(addr, value) => self
                .write_holding(addr, std::slice::from_ref(&value))
                .map(|_| Response::WriteSingleRegister(addr, value)),
            _ => {
                error!(
                    "Exception::IllegalFunction - Unimplemented function code in request: {req:?}"
                );
                Err(ExceptionCode::IllegalFunction)
            }
        };

        if let Err(e) = &res {
            error!("Modbus request error: {:?}", e);
        }

        future::ready(res)
    }
}

impl RgaModbusServer {
    pub fn new(db: Arc<PvDatabase>, names: Arc<RgaPvNames>) -> Self {
        let server = Self {
            db,
            names,
            input_registers: Arc::new(Mutex::new(HashMap::new())),
            holding_registers: Arc::new(Mutex::new(HashMap::new())),
        };
        server.refresh_input_registers();
        server.refresh_holding_registers();
        server
    }

    /// Number of channels in the register map
    pub fn channels(&self) -> usize {
        self.names.channels()
    }

    fn float_pv(&self, name: &str) -> f32 {
        self.db
            .value(name)
            .and_then(|value| value.as_f64())
            .unwrap_or(f64::NAN) as f32
    }

    fn int_pv(&self, name: &str) -> u16 {
        self.db
            .value(name)
            .and_then(|value| value.as_i64())
            .map(|value| value.clamp(0, u16::MAX as i64) as u16)
            .unwrap_or(0)
    }

    /// Rebuild the input registers from the PV database
    pub fn refresh_input_registers(&self) {
        let n = self.channels() as u16;
        let mut regs = lock(&self.input_registers);

        for (i, name) in self.names.readings.iter().enumerate() {
            let [high, low] = f32_to_registers(self.float_pv(name));
            regs.insert(2 * i as u16, high);
            regs.insert(2 * i as u16 + 1, low);
        }
        for (i, name) in self.names.masses.iter().enumerate() {
            let [high, low] = f32_to_registers(self.float_pv(name));
            regs.insert(2 * n + 2 * i as u16, high);
            regs.insert(2 * n + 2 * i as u16 + 1, low);
        }

        let status = self
            .db
            .value(&self.names.status)
            .map(|value| status_code(&value.to_string()))
            .unwrap_or(0);
        regs.insert(4 * n, status);

        // Time of the most recent channel reading, 0 before the first one
        let timestamp = self
            .names
            .readings
            .iter()
            .filter_map(|name| self.db.get(name)?.updated)
            .map(|updated| updated.timestamp())
            .max()
            .unwrap_or(0)
            .clamp(0, u32::MAX as i64) as u32;
        regs.insert(4 * n + 1, (timestamp & 0xFFFF) as u16);
        regs.insert(4 * n + 2, ((timestamp >> 16) & 0xFFFF) as u16);
    }

    /// Mirror the control PVs into the holding registers
    pub fn refresh_holding_registers(&self) {
        let mut regs = lock(&self.holding_registers);
        regs.insert(OPEN_EXP_REGISTER, self.int_pv(&self.names.open_exp));
        regs.insert(ACQUIRE_REGISTER, self.int_pv(&self.names.acquire));
    }

    /// Store the values, then put them on the matching PVs
    fn write_holding(&self, addr: u16, values: &[u16]) -> Result<(), ExceptionCode> {
        register_write(&mut lock(&self.holding_registers), addr, values)?;

        for (i, value) in values.iter().enumerate() {
            let name = match addr + i as u16 {
                OPEN_EXP_REGISTER => &self.names.open_exp,
                ACQUIRE_REGISTER => &self.names.acquire,
                _ => return Err(ExceptionCode::IllegalDataAddress),
            };
            self.db
                .put(name, PvValue::Int(*value as i64))
                .map_err(|err| {
                    error!("Failed to put {} = {}: {}", name, value, err);
                    ExceptionCode::ServerDeviceFailure
                })?;
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Status register value for a status PV text
pub fn status_code(status: &str) -> u16 {
    if status == STATUS_RUNNING {
        1
    } else if status.starts_with(STATUS_ERROR_PREFIX) {
        2
    } else {
        0
    }
}

/// Split an `f32` into two registers, high word first
pub fn f32_to_registers(value: f32) -> [u16; 2] {
    let bits = value.to_bits();
    [(bits >> 16) as u16, (bits & 0xFFFF) as u16]
}

/// Rebuild an `f32` from two registers, high word first
pub fn registers_to_f32(high: u16, low: u16) -> f32 {
    f32::from_bits(((high as u32) << 16) | low as u32)
}

/// Helper function for reading Modbus registers from a HashMap
///
/// Returns `ExceptionCode::IllegalDataAddress` if any requested register
/// address does not exist in the HashMap.
fn register_read(
    registers: &HashMap<u16, u16>,
    addr: u16,
    cnt: u16,
) -> Result<Vec<u16>, ExceptionCode> {
    let mut response_values = vec![0; cnt.into()];

    for i in 0..cnt {
        let reg_addr = addr.wrapping_add(i);
        if let Some(r) = registers.get(&reg_addr) {
            response_values[i as usize] = *r;
        } else {
            error!(
                "Exception::IllegalDataAddress - Register {} not found",
                reg_addr
            );
            return Err(ExceptionCode::IllegalDataAddress);
        }
    }

    debug!("Successfully read {} registers from address {}", cnt, addr);
    Ok(response_values)
}

/// Helper function for writing values to Modbus registers
///
/// Every target address is checked before anything is written.
fn register_write(
    registers: &mut HashMap<u16, u16>,
    addr: u16,
    values: &[u16],
) -> Result<(), ExceptionCode> {
    for i in 0..values.len() {
        let reg_addr = addr.wrapping_add(i as u16);
        if !registers.contains_key(&reg_addr) {
            error!(
                "Exception::IllegalDataAddress - Register {} not found",
                reg_addr
            );
            return Err(ExceptionCode::IllegalDataAddress);
        }
    }
    for (i, value) in values.iter().enumerate() {
        registers.insert(addr.wrapping_add(i as u16), *value);
        debug!("Written value {} to register {}", value, addr as usize + i);
    }
    Ok(())
}
