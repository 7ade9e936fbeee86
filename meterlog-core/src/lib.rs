// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Meterlog Core
//!
//! Domain types shared by the meterlog storage and server crates: bucket
//! arithmetic, the records the stores hold, the source column tables and the
//! error type.

pub mod bucket;
pub mod clock;
pub mod error;
pub mod mapping;
pub mod record;

pub use bucket::{Granularity, Labels};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{MeterlogError, Result};
pub use mapping::{alert_from_row, sample_from_row, SourceRow, ALERT_COLUMNS, SAMPLE_COLUMNS};
pub use record::{AlertFlag, AlertRecord, RawSample, RollupRecord, Timestamp, ENERGY_COUNTER};
