// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event Classification Taxonomy
//!
//! The closed set of classes the categorizer assigns to complete events.
//! Classes travel on the wire as `args["class"]` strings, so the enum has
//! a total `Display`/`FromStr` pair over its SCREAMING_SNAKE names.
//!
//! The `MAIU_*` families describe the collective-communication protocol:
//! `HDMA` (host-DMA assisted), `P2PRDMA` (peer-to-peer RDMA), and the
//! direction-only `PROTOCOL_{SEND,RECV}_DATA` pair assigned by the
//! second classification pass to transfers that overlap a job's compute
//! window.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classification of a complete trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventClass {
    Other,
    ComputePrep,
    ComputeExec,
    DataIn,
    DataOut,
    SenDataConvert,
    MaiuBarrier,
    MaiuWireup,
    RoundtripFlex,
    RoundtripAiu,
    /// Local serial setup (e.g., data structure updates)
    MaiuProtocolSerial,
    /// Host DMA: Wait for 'DATA' signal
    MaiuHdmaProtocolWaitData,
    /// Host DMA: Wait for 'ACK' signal
    MaiuHdmaProtocolWaitAck,
    /// Host DMA: Send 'Data' signal
    MaiuHdmaProtocolSignalData,
    /// Host DMA: Send 'ACK' signal
    MaiuHdmaProtocolSignalAck,
    /// Host DMA: Waiting for the monitor to acknowledge delivery of the notice
    MaiuHdmaProtocolMonitorNotice,
    /// Host DMA: Data Send
    MaiuHdmaProtocolSendData,
    /// Host DMA: Data Recv
    MaiuHdmaProtocolRecvData,
    /// P2P (R)DMA: Data Send
    MaiuP2prdmaProtocolSendData,
    /// P2P (R)DMA: Data Recv
    MaiuP2prdmaProtocolRecvData,
    /// Direction-only send, assigned by the second classification pass
    MaiuProtocolSendData,
    /// Direction-only recv, assigned by the second classification pass
    MaiuProtocolRecvData,
}

impl EventClass {
    /// Wire name (matches the serde representation).
    pub fn as_str(&self) -> &'static str {
        match self {
            EventClass::Other => "OTHER",
            EventClass::ComputePrep => "COMPUTE_PREP",
            EventClass::ComputeExec => "COMPUTE_EXEC",
            EventClass::DataIn => "DATA_IN",
            EventClass::DataOut => "DATA_OUT",
            EventClass::SenDataConvert => "SEN_DATA_CONVERT",
            EventClass::MaiuBarrier => "MAIU_BARRIER",
            EventClass::MaiuWireup => "MAIU_WIREUP",
            EventClass::RoundtripFlex => "ROUNDTRIP_FLEX",
            EventClass::RoundtripAiu => "ROUNDTRIP_AIU",
            EventClass::MaiuProtocolSerial => "MAIU_PROTOCOL_SERIAL",
            EventClass::MaiuHdmaProtocolWaitData => "MAIU_HDMA_PROTOCOL_WAIT_DATA",
            EventClass::MaiuHdmaProtocolWaitAck => "MAIU_HDMA_PROTOCOL_WAIT_ACK",
            EventClass::MaiuHdmaProtocolSignalData => "MAIU_HDMA_PROTOCOL_SIGNAL_DATA",
            EventClass::MaiuHdmaProtocolSignalAck => "MAIU_HDMA_PROTOCOL_SIGNAL_ACK",
            EventClass::MaiuHdmaProtocolMonitorNotice => "MAIU_HDMA_PROTOCOL_MONITOR_NOTICE",
            EventClass::MaiuHdmaProtocolSendData => "MAIU_HDMA_PROTOCOL_SEND_DATA",
            EventClass::MaiuHdmaProtocolRecvData => "MAIU_HDMA_PROTOCOL_RECV_DATA",
            EventClass::MaiuP2prdmaProtocolSendData => "MAIU_P2PRDMA_PROTOCOL_SEND_DATA",
            EventClass::MaiuP2prdmaProtocolRecvData => "MAIU_P2PRDMA_PROTOCOL_RECV_DATA",
            EventClass::MaiuProtocolSendData => "MAIU_PROTOCOL_SEND_DATA",
            EventClass::MaiuProtocolRecvData => "MAIU_PROTOCOL_RECV_DATA",
        }
    }

    /// Whether the class describes a data transfer (bandwidth counters
    /// are synthesized for these).
    pub fn is_transfer(&self) -> bool {
        matches!(
            self,
            EventClass::DataIn
                | EventClass::DataOut
                | EventClass::MaiuHdmaProtocolSendData
                | EventClass::MaiuHdmaProtocolRecvData
                | EventClass::MaiuP2prdmaProtocolSendData
                | EventClass::MaiuP2prdmaProtocolRecvData
                | EventClass::MaiuProtocolSendData
                | EventClass::MaiuProtocolRecvData
        )
    }
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventClass {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let class = match s {
            "OTHER" => EventClass::Other,
            "COMPUTE_PREP" => EventClass::ComputePrep,
            "COMPUTE_EXEC" => EventClass::ComputeExec,
            "DATA_IN" => EventClass::DataIn,
            "DATA_OUT" => EventClass::DataOut,
            "SEN_DATA_CONVERT" => EventClass::SenDataConvert,
            "MAIU_BARRIER" => EventClass::MaiuBarrier,
            "MAIU_WIREUP" => EventClass::MaiuWireup,
            "ROUNDTRIP_FLEX" => EventClass::RoundtripFlex,
            "ROUNDTRIP_AIU" => EventClass::RoundtripAiu,
            "MAIU_PROTOCOL_SERIAL" => EventClass::MaiuProtocolSerial,
            "MAIU_HDMA_PROTOCOL_WAIT_DATA" => EventClass::MaiuHdmaProtocolWaitData,
            "MAIU_HDMA_PROTOCOL_WAIT_ACK" => EventClass::MaiuHdmaProtocolWaitAck,
            "MAIU_HDMA_PROTOCOL_SIGNAL_DATA" => EventClass::MaiuHdmaProtocolSignalData,
            "MAIU_HDMA_PROTOCOL_SIGNAL_ACK" => EventClass::MaiuHdmaProtocolSignalAck,
            "MAIU_HDMA_PROTOCOL_MONITOR_NOTICE" => EventClass::MaiuHdmaProtocolMonitorNotice,
            "MAIU_HDMA_PROTOCOL_SEND_DATA" => EventClass::MaiuHdmaProtocolSendData,
            "MAIU_HDMA_PROTOCOL_RECV_DATA" => EventClass::MaiuHdmaProtocolRecvData,
            "MAIU_P2PRDMA_PROTOCOL_SEND_DATA" => EventClass::MaiuP2prdmaProtocolSendData,
            "MAIU_P2PRDMA_PROTOCOL_RECV_DATA" => EventClass::MaiuP2prdmaProtocolRecvData,
            "MAIU_PROTOCOL_SEND_DATA" => EventClass::MaiuProtocolSendData,
            "MAIU_PROTOCOL_RECV_DATA" => EventClass::MaiuProtocolRecvData,
            _ => return Err(()),
        };
        Ok(class)
    }
}
