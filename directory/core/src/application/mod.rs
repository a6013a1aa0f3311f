// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod operation_gate;
pub mod task_engine;

// Re-export services for convenience
pub use operation_gate::{AdmissionTicket, OperationGate, OperationOutcome, OperationPhase};
pub use task_engine::{TaskEngine, TaskEngineError};
