use std::collections::BTreeMap;

use crate::wire::error::WireError;
use crate::wire::value::WireValue;

/// Closed set of result codes carried on the wire as a small non-negative
/// integer tag (§6.1) — part of the stable protocol surface, never renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Ok,
    Error,
    Unauthorized,
    NotFound,
    VersionMismatch,
}

impl From<ResultCode> for i32 {
    fn from(v: ResultCode) -> i32 {
        match v {
            ResultCode::Ok => 0,
            ResultCode::Error => 1,
            ResultCode::Unauthorized => 2,
            ResultCode::NotFound => 3,
            ResultCode::VersionMismatch => 4,
        }
    }
}

impl TryFrom<i32> for ResultCode {
    type Error = WireError;

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => ResultCode::Ok,
            1 => ResultCode::Error,
            2 => ResultCode::Unauthorized,
            3 => ResultCode::NotFound,
            4 => ResultCode::VersionMismatch,
            other => return Err(WireError::UnknownEnumValue { field: "result_code", value: other }),
        })
    }
}

/// Named control operation carried by `JobControlRequest` (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobControlOp {
    Start,
    StopGraceful,
    StopForceful,
}

impl From<JobControlOp> for i32 {
    fn from(v: JobControlOp) -> i32 {
        match v {
            JobControlOp::Start => 0,
            JobControlOp::StopGraceful => 1,
            JobControlOp::StopForceful => 2,
        }
    }
}

impl TryFrom<i32> for JobControlOp {
    type Error = WireError;

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => JobControlOp::Start,
            1 => JobControlOp::StopGraceful,
            2 => JobControlOp::StopForceful,
            other => return Err(WireError::UnknownEnumValue { field: "job_control_operation", value: other }),
        })
    }
}

/// A single parameter entry as it crosses the wire: flattened to
/// name/display-name/type-tag/value rather than carrying the richer
/// in-process `Parameter` type, since §6.1 only requires enough structure to
/// round-trip a `parameter_list` property.
#[derive(Debug, Clone, PartialEq)]
pub struct WireParameter {
    pub name: String,
    pub value: String,
}

fn encode_parameter_list(params: &[WireParameter]) -> WireValue {
    WireValue::List(
        params
            .iter()
            .map(|p| {
                let mut fields = BTreeMap::new();
                fields.insert(1u8, WireValue::String(p.name.clone()));
                fields.insert(2u8, WireValue::String(p.value.clone()));
                WireValue::Struct(fields)
            })
            .collect(),
    )
}

fn decode_parameter_list(value: WireValue) -> Result<Vec<WireParameter>, WireError> {
    let WireValue::List(items) = value else {
        return Err(WireError::TypeMismatch { expected: "List", actual: "other" });
    };
    items
        .into_iter()
        .map(|item| {
            let WireValue::Struct(mut fields) = item else {
                return Err(WireError::TypeMismatch { expected: "Struct", actual: "other" });
            };
            Ok(WireParameter {
                name: take_string(&mut fields, 1)?,
                value: take_string(&mut fields, 2)?,
            })
        })
        .collect()
}

fn encode_named_bytes(items: &[(String, Vec<u8>)]) -> WireValue {
    WireValue::List(
        items
            .iter()
            .map(|(name, bytes)| {
                let mut fields = BTreeMap::new();
                fields.insert(1u8, WireValue::String(name.clone()));
                fields.insert(2u8, WireValue::Bytes(bytes.clone()));
                WireValue::Struct(fields)
            })
            .collect(),
    )
}

fn decode_named_bytes(value: WireValue) -> Result<Vec<(String, Vec<u8>)>, WireError> {
    let WireValue::List(items) = value else {
        return Err(WireError::TypeMismatch { expected: "List", actual: "other" });
    };
    items
        .into_iter()
        .map(|item| {
            let WireValue::Struct(mut fields) = item else {
                return Err(WireError::TypeMismatch { expected: "Struct", actual: "other" });
            };
            Ok((take_string(&mut fields, 1)?, take_bytes(&mut fields, 2)?))
        })
        .collect()
}

fn encode_string_list(items: &[String]) -> WireValue {
    WireValue::List(items.iter().map(|s| WireValue::String(s.clone())).collect())
}

fn decode_string_list(value: WireValue) -> Result<Vec<String>, WireError> {
    let WireValue::List(items) = value else {
        return Err(WireError::TypeMismatch { expected: "List", actual: "other" });
    };
    items.into_iter().map(String::try_from).collect()
}

/// The message set (C2, §4.3): every payload kind exchanged between a client
/// and the scheduler. Each variant maps to one tag byte in the envelope; the
/// tag numbering is part of the stable wire contract, not an implementation
/// detail, so existing values are never renumbered — only appended to.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    ClientHello {
        client_id: Option<String>,
        version: (u8, u8, u8),
        restricted_mode: bool,
        auth_method: Option<String>,
        auth_id: Option<String>,
        auth_credentials: Option<String>,
        require_server_auth: bool,
    },
    MonitorClientHello {
        client_id: Option<String>,
        version: (u8, u8, u8),
        restricted_mode: bool,
        monitor_classes: Vec<String>,
        auth_method: Option<String>,
        auth_id: Option<String>,
        auth_credentials: Option<String>,
        require_server_auth: bool,
    },
    ClientManagerHello {
        client_manager_id: String,
        max_clients: u32,
    },
    ServerHello {
        result_code: ResultCode,
        result_message: Option<String>,
        server_version: (u8, u8, u8),
        auth_credentials: Option<String>,
    },
    ClassTransferRequest {
        class_names: Vec<String>,
        include_dependencies: bool,
    },
    ClassTransferResponse {
        result_code: ResultCode,
        result_message: Option<String>,
        classes: Vec<(String, Vec<u8>)>,
    },
    ClientUpgradeRequest {
        upgrade_file_name: String,
        upgrade_file_data: Vec<u8>,
    },
    ClientUpgradeResponse {
        result_code: ResultCode,
        result_message: Option<String>,
    },
    JobRequest {
        job_id: String,
        job_class: String,
        job_class_version: Option<String>,
        num_clients: u32,
        threads_per_client: u32,
        client_number: u32,
        start_time: i64,
        duration: Option<u64>,
        collection_interval: u32,
        parameter_list: Vec<WireParameter>,
        report_in_progress_stats: bool,
        in_progress_report_interval: u32,
        thread_startup_delay_ms: u64,
    },
    JobResponse {
        job_id: String,
        result_code: ResultCode,
        result_message: Option<String>,
    },
    JobControlRequest {
        job_id: String,
        job_control_operation: JobControlOp,
    },
    RegisterStatistic {
        job_id: String,
        client_id: String,
        thread_id: u32,
        display_name: String,
    },
    ReportStatistic {
        job_id: String,
        in_progress_data: Vec<u8>,
    },
    JobCompleted {
        job_id: String,
        job_state: String,
        actual_start_time: Option<i64>,
        actual_stop_time: Option<i64>,
        actual_duration: Option<i64>,
        stat_tracker_payload: Vec<u8>,
        monitor_tracker_payload: Option<Vec<u8>>,
        uploaded_files: Vec<(String, Vec<u8>)>,
        log_messages: Vec<String>,
    },
    StatusRequest {
        job_id: Option<String>,
    },
    StatusResponse {
        client_state: String,
        job_id: Option<String>,
        job_state: Option<String>,
    },
    KeepAlive,
    ClientDisconnect {
        disconnect_reason: Option<String>,
    },
    ServerDisconnect {
        disconnect_reason: Option<String>,
        is_transient: bool,
        client_should_close: bool,
    },
}

impl Message {
    pub fn tag(&self) -> u8 {
        match self {
            Message::ClientHello { .. } => 1,
            Message::MonitorClientHello { .. } => 2,
            Message::ClientManagerHello { .. } => 3,
            Message::ServerHello { .. } => 4,
            Message::ClassTransferRequest { .. } => 5,
            Message::ClassTransferResponse { .. } => 6,
            Message::ClientUpgradeRequest { .. } => 7,
            Message::ClientUpgradeResponse { .. } => 8,
            Message::JobRequest { .. } => 9,
            Message::JobResponse { .. } => 10,
            Message::JobControlRequest { .. } => 11,
            Message::RegisterStatistic { .. } => 12,
            Message::ReportStatistic { .. } => 13,
            Message::JobCompleted { .. } => 14,
            Message::StatusRequest { .. } => 15,
            Message::StatusResponse { .. } => 16,
            Message::KeepAlive => 17,
            Message::ClientDisconnect { .. } => 18,
            Message::ServerDisconnect { .. } => 19,
        }
    }

    pub fn into_fields(self) -> BTreeMap<u8, WireValue> {
        let mut fields = BTreeMap::new();
        match self {
            Message::ClientHello {
                client_id,
                version,
                restricted_mode,
                auth_method,
                auth_id,
                auth_credentials,
                require_server_auth,
            } => {
                put_opt_string(&mut fields, 1, client_id);
                put_version(&mut fields, 2, version);
                fields.insert(3, WireValue::Bool(restricted_mode));
                put_opt_string(&mut fields, 4, auth_method);
                put_opt_string(&mut fields, 5, auth_id);
                put_opt_string(&mut fields, 6, auth_credentials);
                fields.insert(7, WireValue::Bool(require_server_auth));
            }
            Message::MonitorClientHello {
                client_id,
                version,
                restricted_mode,
                monitor_classes,
                auth_method,
                auth_id,
                auth_credentials,
                require_server_auth,
            } => {
                put_opt_string(&mut fields, 1, client_id);
                put_version(&mut fields, 2, version);
                fields.insert(3, WireValue::Bool(restricted_mode));
                fields.insert(4, encode_string_list(&monitor_classes));
                put_opt_string(&mut fields, 5, auth_method);
                put_opt_string(&mut fields, 6, auth_id);
                put_opt_string(&mut fields, 7, auth_credentials);
                fields.insert(8, WireValue::Bool(require_server_auth));
            }
            Message::ClientManagerHello { client_manager_id, max_clients } => {
                fields.insert(1, WireValue::String(client_manager_id));
                fields.insert(2, WireValue::Int(max_clients as i32));
            }
            Message::ServerHello { result_code, result_message, server_version, auth_credentials } => {
                fields.insert(1, WireValue::Int(result_code.into()));
                put_opt_string(&mut fields, 2, result_message);
                put_version(&mut fields, 3, server_version);
                put_opt_string(&mut fields, 4, auth_credentials);
            }
            Message::ClassTransferRequest { class_names, include_dependencies } => {
                fields.insert(1, encode_string_list(&class_names));
                fields.insert(2, WireValue::Bool(include_dependencies));
            }
            Message::ClassTransferResponse { result_code, result_message, classes } => {
                fields.insert(1, WireValue::Int(result_code.into()));
                put_opt_string(&mut fields, 2, result_message);
                fields.insert(3, encode_named_bytes(&classes));
            }
            Message::ClientUpgradeRequest { upgrade_file_name, upgrade_file_data } => {
                fields.insert(1, WireValue::String(upgrade_file_name));
                fields.insert(2, WireValue::Bytes(upgrade_file_data));
            }
            Message::ClientUpgradeResponse { result_code, result_message } => {
                fields.insert(1, WireValue::Int(result_code.into()));
                put_opt_string(&mut fields, 2, result_message);
            }
            Message::JobRequest {
                job_id,
                job_class,
                job_class_version,
                num_clients,
                threads_per_client,
                client_number,
                start_time,
                duration,
                collection_interval,
                parameter_list,
                report_in_progress_stats,
                in_progress_report_interval,
                thread_startup_delay_ms,
            } => {
                fields.insert(1, WireValue::String(job_id));
                fields.insert(2, WireValue::String(job_class));
                put_opt_string(&mut fields, 3, job_class_version);
                fields.insert(4, WireValue::Int(num_clients as i32));
                fields.insert(5, WireValue::Int(threads_per_client as i32));
                fields.insert(6, WireValue::Int(client_number as i32));
                fields.insert(7, WireValue::Long(start_time));
                if let Some(d) = duration {
                    fields.insert(8, WireValue::Long(d as i64));
                }
                fields.insert(9, WireValue::Int(collection_interval as i32));
                fields.insert(10, encode_parameter_list(&parameter_list));
                fields.insert(11, WireValue::Bool(report_in_progress_stats));
                fields.insert(12, WireValue::Int(in_progress_report_interval as i32));
                fields.insert(13, WireValue::Long(thread_startup_delay_ms as i64));
            }
            Message::JobResponse { job_id, result_code, result_message } => {
                fields.insert(1, WireValue::String(job_id));
                fields.insert(2, WireValue::Int(result_code.into()));
                put_opt_string(&mut fields, 3, result_message);
            }
            Message::JobControlRequest { job_id, job_control_operation } => {
                fields.insert(1, WireValue::String(job_id));
                fields.insert(2, WireValue::Int(job_control_operation.into()));
            }
            Message::RegisterStatistic { job_id, client_id, thread_id, display_name } => {
                fields.insert(1, WireValue::String(job_id));
                fields.insert(2, WireValue::String(client_id));
                fields.insert(3, WireValue::Int(thread_id as i32));
                fields.insert(4, WireValue::String(display_name));
            }
            Message::ReportStatistic { job_id, in_progress_data } => {
                fields.insert(1, WireValue::String(job_id));
                fields.insert(2, WireValue::Bytes(in_progress_data));
            }
            Message::JobCompleted {
                job_id,
                job_state,
                actual_start_time,
                actual_stop_time,
                actual_duration,
                stat_tracker_payload,
                monitor_tracker_payload,
                uploaded_files,
                log_messages,
            } => {
                fields.insert(1, WireValue::String(job_id));
                fields.insert(2, WireValue::String(job_state));
                if let Some(v) = actual_start_time {
                    fields.insert(3, WireValue::Long(v));
                }
                if let Some(v) = actual_stop_time {
                    fields.insert(4, WireValue::Long(v));
                }
                if let Some(v) = actual_duration {
                    fields.insert(5, WireValue::Long(v));
                }
                fields.insert(6, WireValue::Bytes(stat_tracker_payload));
                if let Some(v) = monitor_tracker_payload {
                    fields.insert(7, WireValue::Bytes(v));
                }
                fields.insert(8, encode_named_bytes(&uploaded_files));
                fields.insert(9, encode_string_list(&log_messages));
            }
            Message::StatusRequest { job_id } => {
                put_opt_string(&mut fields, 1, job_id);
            }
            Message::StatusResponse { client_state, job_id, job_state } => {
                fields.insert(1, WireValue::String(client_state));
                put_opt_string(&mut fields, 2, job_id);
                put_opt_string(&mut fields, 3, job_state);
            }
            Message::KeepAlive => {}
            Message::ClientDisconnect { disconnect_reason } => {
                put_opt_string(&mut fields, 1, disconnect_reason);
            }
            Message::ServerDisconnect { disconnect_reason, is_transient, client_should_close } => {
                put_opt_string(&mut fields, 1, disconnect_reason);
                fields.insert(2, WireValue::Bool(is_transient));
                fields.insert(3, WireValue::Bool(client_should_close));
            }
        }
        fields
    }

    pub fn from_tag_and_fields(tag: u8, mut fields: BTreeMap<u8, WireValue>) -> Result<Self, WireError> {
        Ok(match tag {
            1 => Message::ClientHello {
                client_id: take_opt_string(&mut fields, 1),
                version: take_version(&mut fields, 2)?,
                restricted_mode: take_bool(&mut fields, 3)?,
                auth_method: take_opt_string(&mut fields, 4),
                auth_id: take_opt_string(&mut fields, 5),
                auth_credentials: take_opt_string(&mut fields, 6),
                require_server_auth: fields.remove(&7).map(bool::try_from).transpose()?.unwrap_or(false),
            },
            2 => Message::MonitorClientHello {
                client_id: take_opt_string(&mut fields, 1),
                version: take_version(&mut fields, 2)?,
                restricted_mode: take_bool(&mut fields, 3)?,
                monitor_classes: decode_string_list(fields.remove(&4).unwrap_or(WireValue::List(Vec::new())))?,
                auth_method: take_opt_string(&mut fields, 5),
                auth_id: take_opt_string(&mut fields, 6),
                auth_credentials: take_opt_string(&mut fields, 7),
                require_server_auth: fields.remove(&8).map(bool::try_from).transpose()?.unwrap_or(false),
            },
            3 => Message::ClientManagerHello {
                client_manager_id: take_string(&mut fields, 1)?,
                max_clients: take_i32(&mut fields, 2)? as u32,
            },
            4 => Message::ServerHello {
                result_code: take_i32(&mut fields, 1)?.try_into()?,
                result_message: take_opt_string(&mut fields, 2),
                server_version: take_version(&mut fields, 3)?,
                auth_credentials: take_opt_string(&mut fields, 4),
            },
            5 => Message::ClassTransferRequest {
                class_names: decode_string_list(fields.remove(&1).ok_or(WireError::MissingRequiredField(1))?)?,
                include_dependencies: take_bool(&mut fields, 2)?,
            },
            6 => Message::ClassTransferResponse {
                result_code: take_i32(&mut fields, 1)?.try_into()?,
                result_message: take_opt_string(&mut fields, 2),
                classes: decode_named_bytes(fields.remove(&3).unwrap_or(WireValue::List(Vec::new())))?,
            },
            7 => Message::ClientUpgradeRequest {
                upgrade_file_name: take_string(&mut fields, 1)?,
                upgrade_file_data: take_bytes(&mut fields, 2)?,
            },
            8 => Message::ClientUpgradeResponse {
                result_code: take_i32(&mut fields, 1)?.try_into()?,
                result_message: take_opt_string(&mut fields, 2),
            },
            9 => Message::JobRequest {
                job_id: take_string(&mut fields, 1)?,
                job_class: take_string(&mut fields, 2)?,
                job_class_version: take_opt_string(&mut fields, 3),
                num_clients: take_i32(&mut fields, 4)? as u32,
                threads_per_client: take_i32(&mut fields, 5)? as u32,
                client_number: take_i32(&mut fields, 6)? as u32,
                start_time: take_i64(&mut fields, 7)?,
                duration: fields.remove(&8).map(i64::try_from).transpose()?.map(|v| v as u64),
                collection_interval: take_i32(&mut fields, 9)? as u32,
                parameter_list: decode_parameter_list(fields.remove(&10).unwrap_or(WireValue::List(Vec::new())))?,
                report_in_progress_stats: take_bool(&mut fields, 11)?,
                in_progress_report_interval: take_i32(&mut fields, 12)? as u32,
                thread_startup_delay_ms: fields.remove(&13).map(i64::try_from).transpose()?.map(|v| v as u64).unwrap_or(0),
            },
            10 => Message::JobResponse {
                job_id: take_string(&mut fields, 1)?,
                result_code: take_i32(&mut fields, 2)?.try_into()?,
                result_message: take_opt_string(&mut fields, 3),
            },
            11 => Message::JobControlRequest {
                job_id: take_string(&mut fields, 1)?,
                job_control_operation: take_i32(&mut fields, 2)?.try_into()?,
            },
            12 => Message::RegisterStatistic {
                job_id: take_string(&mut fields, 1)?,
                client_id: take_string(&mut fields, 2)?,
                thread_id: take_i32(&mut fields, 3)? as u32,
                display_name: take_string(&mut fields, 4)?,
            },
            13 => Message::ReportStatistic {
                job_id: take_string(&mut fields, 1)?,
                in_progress_data: take_bytes(&mut fields, 2)?,
            },
            14 => Message::JobCompleted {
                job_id: take_string(&mut fields, 1)?,
                job_state: take_string(&mut fields, 2)?,
                actual_start_time: fields.remove(&3).map(i64::try_from).transpose()?,
                actual_stop_time: fields.remove(&4).map(i64::try_from).transpose()?,
                actual_duration: fields.remove(&5).map(i64::try_from).transpose()?,
                stat_tracker_payload: take_bytes(&mut fields, 6)?,
                monitor_tracker_payload: fields.remove(&7).map(Vec::<u8>::try_from).transpose()?,
                uploaded_files: decode_named_bytes(fields.remove(&8).unwrap_or(WireValue::List(Vec::new())))?,
                log_messages: decode_string_list(fields.remove(&9).unwrap_or(WireValue::List(Vec::new())))?,
            },
            15 => Message::StatusRequest { job_id: take_opt_string(&mut fields, 1) },
            16 => Message::StatusResponse {
                client_state: take_string(&mut fields, 1)?,
                job_id: take_opt_string(&mut fields, 2),
                job_state: take_opt_string(&mut fields, 3),
            },
            17 => Message::KeepAlive,
            18 => Message::ClientDisconnect { disconnect_reason: take_opt_string(&mut fields, 1) },
            19 => Message::ServerDisconnect {
                disconnect_reason: take_opt_string(&mut fields, 1),
                is_transient: take_bool(&mut fields, 2)?,
                client_should_close: take_bool(&mut fields, 3)?,
            },
            other => return Err(WireError::UnknownMessageTag(other)),
        })
    }
}

fn put_opt_string(fields: &mut BTreeMap<u8, WireValue>, tag: u8, value: Option<String>) {
    if let Some(v) = value {
        fields.insert(tag, WireValue::String(v));
    }
}

fn put_version(fields: &mut BTreeMap<u8, WireValue>, tag: u8, version: (u8, u8, u8)) {
    let mut v = BTreeMap::new();
    v.insert(1u8, WireValue::Byte(version.0));
    v.insert(2u8, WireValue::Byte(version.1));
    v.insert(3u8, WireValue::Byte(version.2));
    fields.insert(tag, WireValue::Struct(v));
}

fn take_version(fields: &mut BTreeMap<u8, WireValue>, tag: u8) -> Result<(u8, u8, u8), WireError> {
    let WireValue::Struct(mut v) = fields.remove(&tag).ok_or(WireError::MissingRequiredField(tag))? else {
        return Err(WireError::TypeMismatch { expected: "Struct", actual: "other" });
    };
    let byte = |fields: &mut BTreeMap<u8, WireValue>, t: u8| -> Result<u8, WireError> {
        match fields.remove(&t).ok_or(WireError::MissingRequiredField(t))? {
            WireValue::Byte(b) => Ok(b),
            WireValue::Int(i) => Ok(i as u8),
            other => Err(WireError::TypeMismatch { expected: "Byte", actual: variant_name(&other) }),
        }
    };
    Ok((byte(&mut v, 1)?, byte(&mut v, 2)?, byte(&mut v, 3)?))
}

fn variant_name(value: &WireValue) -> &'static str {
    match value {
        WireValue::Bool(_) => "Bool",
        WireValue::Byte(_) => "Byte",
        WireValue::Short(_) => "Short",
        WireValue::Int(_) => "Int",
        WireValue::Long(_) => "Long",
        WireValue::Float(_) => "Float",
        WireValue::Double(_) => "Double",
        WireValue::String(_) => "String",
        WireValue::Struct(_) => "Struct",
        WireValue::Map(_) => "Map",
        WireValue::List(_) => "List",
        WireValue::Bytes(_) => "Bytes",
        WireValue::StructBegin => "StructBegin",
        WireValue::StructEnd => "StructEnd",
    }
}

fn take_string(fields: &mut BTreeMap<u8, WireValue>, tag: u8) -> Result<String, WireError> {
    fields.remove(&tag).ok_or(WireError::MissingRequiredField(tag))?.try_into()
}

fn take_opt_string(fields: &mut BTreeMap<u8, WireValue>, tag: u8) -> Option<String> {
    fields.remove(&tag).and_then(|v| String::try_from(v).ok())
}

fn take_bytes(fields: &mut BTreeMap<u8, WireValue>, tag: u8) -> Result<Vec<u8>, WireError> {
    fields.remove(&tag).ok_or(WireError::MissingRequiredField(tag))?.try_into()
}

fn take_i32(fields: &mut BTreeMap<u8, WireValue>, tag: u8) -> Result<i32, WireError> {
    fields.remove(&tag).ok_or(WireError::MissingRequiredField(tag))?.try_into()
}

fn take_i64(fields: &mut BTreeMap<u8, WireValue>, tag: u8) -> Result<i64, WireError> {
    fields.remove(&tag).ok_or(WireError::MissingRequiredField(tag))?.try_into()
}

fn take_bool(fields: &mut BTreeMap<u8, WireValue>, tag: u8) -> Result<bool, WireError> {
    fields.remove(&tag).ok_or(WireError::MissingRequiredField(tag))?.try_into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: Message) -> Message {
        let tag = msg.tag();
        let fields = msg.clone().into_fields();
        Message::from_tag_and_fields(tag, fields).unwrap()
    }

    #[test]
    fn job_request_round_trips_through_fields() {
        let msg = Message::JobRequest {
            job_id: "job-1".into(),
            job_class: "com.example.LoadTest".into(),
            job_class_version: Some("1.2".into()),
            num_clients: 2,
            threads_per_client: 4,
            client_number: 0,
            start_time: 1_700_000_000_000,
            duration: Some(30),
            collection_interval: 5,
            parameter_list: vec![WireParameter { name: "url".into(), value: "http://x".into() }],
            report_in_progress_stats: true,
            in_progress_report_interval: 10,
            thread_startup_delay_ms: 250,
        };
        assert_eq!(round_trip(msg.clone()), msg);
    }

    #[test]
    fn job_completed_round_trips_with_optional_fields_absent() {
        let msg = Message::JobCompleted {
            job_id: "job-1".into(),
            job_state: "Completed".into(),
            actual_start_time: Some(1),
            actual_stop_time: Some(2),
            actual_duration: Some(1),
            stat_tracker_payload: vec![1, 2, 3],
            monitor_tracker_payload: None,
            uploaded_files: vec![("out.log".into(), vec![9, 9])],
            log_messages: vec!["started".into(), "done".into()],
        };
        assert_eq!(round_trip(msg.clone()), msg);
    }

    #[test]
    fn server_disconnect_round_trips() {
        let msg = Message::ServerDisconnect {
            disconnect_reason: Some("shutting down".into()),
            is_transient: true,
            client_should_close: true,
        };
        assert_eq!(round_trip(msg.clone()), msg);
    }

    #[test]
    fn client_hello_round_trips_restricted_mode_and_version() {
        let msg = Message::ClientHello {
            client_id: Some("c1".into()),
            version: (2, 1, 0),
            restricted_mode: true,
            auth_method: None,
            auth_id: None,
            auth_credentials: None,
            require_server_auth: false,
        };
        assert_eq!(round_trip(msg.clone()), msg);
    }

    #[test]
    fn missing_field_is_rejected() {
        let fields = BTreeMap::new();
        let err = Message::from_tag_and_fields(9, fields).unwrap_err();
        assert!(matches!(err, WireError::MissingRequiredField(1)));
    }

    #[test]
    fn unknown_message_tag_is_rejected() {
        let err = Message::from_tag_and_fields(250, BTreeMap::new()).unwrap_err();
        assert!(matches!(err, WireError::UnknownMessageTag(250)));
    }
}
