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


//! Static column tables translating source rows into meterlog records.
//!
//! Both the telemetry host and the alert database hand back rows of
//! string-valued columns. Each table below lists the columns we read, the
//! field they land in and how the text is coerced. A coercion failure is an
//! error; nothing is silently defaulted.

use crate::error::{MeterlogError, Result};
use crate::record::{AlertRecord, RawSample, Timestamp, ENERGY_COUNTER};
use chrono::{Local, NaiveDateTime, TimeZone};
use std::collections::BTreeMap;

/// One row as returned by a source: column name to text value.
pub type SourceRow = BTreeMap<String, String>;

/// Column carrying the telemetry host's own export time.
pub const SAMPLE_TIME_COLUMN: &str = "RTEXPDTIME";

/// Layout of [`SAMPLE_TIME_COLUMN`], e.g. `2024/06/10 13:45:00`.
pub const SAMPLE_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Layout of the alert event time, e.g. `2024-06-10T13:45:00Z`. The source
/// writes local wall time with a literal `Z` suffix.
pub const ALERT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFieldKind {
    /// Parsed as an integer into [`RawSample::counters`].
    Counter,
    /// Copied verbatim into [`RawSample::descriptors`].
    Descriptor,
}

#[derive(Debug, Clone, Copy)]
pub struct SampleColumn {
    pub column: &'static str,
    pub target: &'static str,
    pub kind: SampleFieldKind,
}

const fn counter(column: &'static str, target: &'static str) -> SampleColumn {
    SampleColumn {
        column,
        target,
        kind: SampleFieldKind::Counter,
    }
}

const fn descriptor(column: &'static str, target: &'static str) -> SampleColumn {
    SampleColumn {
        column,
        target,
        kind: SampleFieldKind::Descriptor,
    }
}

/// Telemetry columns. Columns absent from a row are skipped.
pub const SAMPLE_COLUMNS: &[SampleColumn] = &[
    // Machine descriptors
    descriptor("CNC1", "floor"),
    descriptor("CNC2", "site"),
    descriptor("CNC3", "equipment_no"),
    descriptor("CNC4", "modify_time"),
    descriptor("CNC5", "cnc_name"),
    descriptor("CNC6", "status"),
    descriptor("CNC7", "current_program"),
    descriptor("CNC8", "sequence_number"),
    descriptor("CNC9", "spindle_load"),
    descriptor("CNC10", "spindle_temp"),
    descriptor("CNC11", "spindle_current"),
    descriptor("CNC12", "axis_x_load"),
    descriptor("CNC13", "axis_y_load"),
    descriptor("CNC14", "axis_z_load"),
    descriptor("CNC15", "axis_x_temp"),
    descriptor("CNC16", "axis_y_temp"),
    descriptor("CNC17", "axis_z_temp"),
    descriptor("CNC18", "axis_x_current"),
    descriptor("CNC19", "axis_y_current"),
    descriptor("CNC20", "axis_z_current"),
    descriptor("CNC21", "spindle_speed"),
    descriptor("CNC22", "spindle_feed_rate"),
    descriptor("CNC23", "spindle_torque"),
    descriptor("CNC24", "axis_x_torque"),
    descriptor("CNC25", "axis_y_torque"),
    descriptor("CNC26", "axis_z_torque"),
    descriptor("CNC27", "alarm_time"),
    descriptor("CNC28", "recover_time"),
    descriptor("CNC29", "record_time"),
    descriptor("CNC30", "start_time"),
    descriptor("CNC31", "factory"),
    descriptor("CNC32", "floor2"),
    descriptor("CNC33", "equipment_id"),
    descriptor("CNC34", "equipment_name"),
    descriptor("CNC35", "failure_reason"),
    descriptor("CNC36", "power_time"),
    descriptor("CNC37", "operation_time"),
    descriptor("CNC38", "num"),
    descriptor("CNC39", "repair_time"),
    descriptor("CNC40", "idle_time"),
    descriptor("CNC41", "alarm_messages"),
    // Environment sensors 1-6: PM2.5, CO2, HCHO, TVOC, temperature, humidity, PM10
    counter("M42", "sax01_pm25"),
    counter("M43", "sax01_co2"),
    counter("M44", "sax01_hcho"),
    counter("M45", "sax01_tvoc"),
    counter("M46", "sax01_temperature"),
    counter("M47", "sax01_humidity"),
    counter("M48", "sax01_pm10"),
    counter("M49", "sax02_pm25"),
    counter("M50", "sax02_co2"),
    counter("M51", "sax02_hcho"),
    counter("M52", "sax02_tvoc"),
    counter("M53", "sax02_temperature"),
    counter("M54", "sax02_humidity"),
    counter("M55", "sax02_pm10"),
    counter("M56", "sax03_pm25"),
    counter("M57", "sax03_co2"),
    counter("M58", "sax03_hcho"),
    counter("M59", "sax03_tvoc"),
    counter("M60", "sax03_temperature"),
    counter("M61", "sax03_humidity"),
    counter("M62", "sax03_pm10"),
    counter("M63", "sax04_pm25"),
    counter("M64", "sax04_co2"),
    counter("M65", "sax04_hcho"),
    counter("M66", "sax04_tvoc"),
    counter("M67", "sax04_temperature"),
    counter("M68", "sax04_humidity"),
    counter("M69", "sax04_pm10"),
    counter("M70", "sax05_pm25"),
    counter("M71", "sax05_co2"),
    counter("M72", "sax05_hcho"),
    counter("M73", "sax05_tvoc"),
    counter("M74", "sax05_temperature"),
    counter("M75", "sax05_humidity"),
    counter("M76", "sax05_pm10"),
    counter("M77", "sax06_pm25"),
    counter("M78", "sax06_co2"),
    counter("M79", "sax06_hcho"),
    counter("M80", "sax06_tvoc"),
    counter("M81", "sax06_temperature"),
    counter("M82", "sax06_humidity"),
    counter("M83", "sax06_pm10"),
    // Power meter
    counter("M84", "pm_v_rs"),
    counter("M85", "pm_v_st"),
    counter("M86", "pm_v_tr"),
    counter("M87", "pm_i_r"),
    counter("M88", "pm_i_s"),
    counter("M89", "pm_i_t"),
    counter("M90", "pm_hz"),
    counter("M91", "pm_kw"),
    counter("M92", "pm_pf"),
    counter("M93", ENERGY_COUNTER),
];

/// Build a [`RawSample`] from a telemetry row.
///
/// The sample time comes from [`SAMPLE_TIME_COLUMN`]; the raw sampler later
/// restamps it with the scheduled tick.
pub fn sample_from_row(row: &SourceRow) -> Result<RawSample> {
    let raw_time = row
        .get(SAMPLE_TIME_COLUMN)
        .ok_or(MeterlogError::MissingColumn(SAMPLE_TIME_COLUMN))?;
    let time = parse_local_time(SAMPLE_TIME_COLUMN, "time", raw_time, SAMPLE_TIME_FORMAT)?;

    let mut sample = RawSample::new(time);
    for column in SAMPLE_COLUMNS {
        let Some(value) = row.get(column.column) else {
            continue;
        };
        match column.kind {
            SampleFieldKind::Counter => {
                let parsed = parse_integer(column.column, column.target, value)?;
                sample.counters.insert(column.target.to_string(), parsed);
            }
            SampleFieldKind::Descriptor => {
                sample
                    .descriptors
                    .insert(column.target.to_string(), value.clone());
            }
        }
    }
    Ok(sample)
}

/// Alert fields collected while walking [`ALERT_COLUMNS`].
#[derive(Debug, Default)]
pub struct AlertDraft {
    alert_event_id: Option<i64>,
    alert_type: Option<i64>,
    alert_event_time: Option<Timestamp>,
    var_tag: Option<String>,
    comment: Option<String>,
    line_text: Option<String>,
}

pub struct AlertColumn {
    pub column: &'static str,
    pub target: &'static str,
    apply: fn(&mut AlertDraft, &AlertColumn, &str) -> Result<()>,
}

/// Alert columns. Every column is required; `is_read` and `is_hidden` have no
/// source column and keep their defaults.
pub const ALERT_COLUMNS: &[AlertColumn] = &[
    AlertColumn {
        column: "ALERTEVENTID",
        target: "alert_event_id",
        apply: |draft, col, value| {
            draft.alert_event_id = Some(parse_integer(col.column, col.target, value)?);
            Ok(())
        },
    },
    AlertColumn {
        column: "ALERTEVENTTIME",
        target: "alert_event_time",
        apply: |draft, col, value| {
            draft.alert_event_time =
                Some(parse_local_time(col.column, col.target, value, ALERT_TIME_FORMAT)?);
            Ok(())
        },
    },
    AlertColumn {
        column: "VARTAG",
        target: "var_tag",
        apply: |draft, _, value| {
            draft.var_tag = Some(value.to_string());
            Ok(())
        },
    },
    AlertColumn {
        column: "COMMENT",
        target: "comment",
        apply: |draft, _, value| {
            draft.comment = Some(value.to_string());
            Ok(())
        },
    },
    AlertColumn {
        column: "ALERTTYPE",
        target: "alert_type",
        apply: |draft, col, value| {
            draft.alert_type = Some(parse_integer(col.column, col.target, value)?);
            Ok(())
        },
    },
    AlertColumn {
        column: "LINETEXT",
        target: "line_text",
        apply: |draft, _, value| {
            draft.line_text = Some(value.to_string());
            Ok(())
        },
    },
];

/// Build an [`AlertRecord`] from an alert source row.
pub fn alert_from_row(row: &SourceRow) -> Result<AlertRecord> {
    let mut draft = AlertDraft::default();
    for column in ALERT_COLUMNS {
        let value = row
            .get(column.column)
            .ok_or(MeterlogError::MissingColumn(column.column))?;
        (column.apply)(&mut draft, column, value)?;
    }

    let id = draft
        .alert_event_id
        .ok_or(MeterlogError::MissingColumn("ALERTEVENTID"))?;
    let time = draft
        .alert_event_time
        .ok_or(MeterlogError::MissingColumn("ALERTEVENTTIME"))?;

    let mut record = AlertRecord::new(id, time);
    record.alert_type = draft.alert_type.unwrap_or_default();
    record.var_tag = draft.var_tag.unwrap_or_default();
    record.comment = draft.comment.unwrap_or_default();
    record.line_text = draft.line_text.unwrap_or_default();
    Ok(record)
}

fn parse_integer(column: &'static str, target: &'static str, value: &str) -> Result<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|e| MeterlogError::FieldCoercion {
            column,
            target,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn parse_local_time(
    column: &'static str,
    target: &'static str,
    value: &str,
    format: &str,
) -> Result<Timestamp> {
    let coercion = |reason: String| MeterlogError::FieldCoercion {
        column,
        target,
        value: value.to_string(),
        reason,
    };
    let naive = NaiveDateTime::parse_from_str(value.trim(), format)
        .map_err(|e| coercion(e.to_string()))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| coercion("no such local time".to_string()))
}
