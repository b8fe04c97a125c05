//! Aktionskatalog und Payload-Schemata
//!
//! Der Katalog ist geschlossen: ein Call mit einer Aktion, die hier nicht
//! aufgefuehrt ist, wird schon beim Dekodieren abgelehnt. Fuer die
//! Aktionen, die der Gateway selbst beantwortet oder selbst sendet, gibt
//! es typisierte Payload-Strukturen (camelCase auf dem Draht).

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Aktionen
// ---------------------------------------------------------------------------

/// Alle bekannten Aktionen (OCPP 1.6 Core-Profil)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    // Ladepunkt -> Zentrale
    Authorize,
    BootNotification,
    DataTransfer,
    Heartbeat,
    MeterValues,
    StartTransaction,
    StatusNotification,
    StopTransaction,

    // Zentrale -> Ladepunkt
    ChangeAvailability,
    ChangeConfiguration,
    ClearCache,
    GetConfiguration,
    RemoteStartTransaction,
    RemoteStopTransaction,
    Reset,
    TriggerMessage,
    UnlockConnector,
}

impl Action {
    /// Der vollstaendige Katalog
    pub const ALLE: [Action; 17] = [
        Self::Authorize,
        Self::BootNotification,
        Self::DataTransfer,
        Self::Heartbeat,
        Self::MeterValues,
        Self::StartTransaction,
        Self::StatusNotification,
        Self::StopTransaction,
        Self::ChangeAvailability,
        Self::ChangeConfiguration,
        Self::ClearCache,
        Self::GetConfiguration,
        Self::RemoteStartTransaction,
        Self::RemoteStopTransaction,
        Self::Reset,
        Self::TriggerMessage,
        Self::UnlockConnector,
    ];

    /// Gibt den Aktionsnamen zurueck wie er auf dem Draht steht
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorize => "Authorize",
            Self::BootNotification => "BootNotification",
            Self::DataTransfer => "DataTransfer",
            Self::Heartbeat => "Heartbeat",
            Self::MeterValues => "MeterValues",
            Self::StartTransaction => "StartTransaction",
            Self::StatusNotification => "StatusNotification",
            Self::StopTransaction => "StopTransaction",
            Self::ChangeAvailability => "ChangeAvailability",
            Self::ChangeConfiguration => "ChangeConfiguration",
            Self::ClearCache => "ClearCache",
            Self::GetConfiguration => "GetConfiguration",
            Self::RemoteStartTransaction => "RemoteStartTransaction",
            Self::RemoteStopTransaction => "RemoteStopTransaction",
            Self::Reset => "Reset",
            Self::TriggerMessage => "TriggerMessage",
            Self::UnlockConnector => "UnlockConnector",
        }
    }

    /// Gibt `true` zurueck wenn die Aktion vom Ladepunkt ausgeht
    pub fn vom_ladepunkt(&self) -> bool {
        matches!(
            self,
            Self::Authorize
                | Self::BootNotification
                | Self::DataTransfer
                | Self::Heartbeat
                | Self::MeterValues
                | Self::StartTransaction
                | Self::StatusNotification
                | Self::StopTransaction
        )
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Authorize" => Ok(Self::Authorize),
            "BootNotification" => Ok(Self::BootNotification),
            "DataTransfer" => Ok(Self::DataTransfer),
            "Heartbeat" => Ok(Self::Heartbeat),
            "MeterValues" => Ok(Self::MeterValues),
            "StartTransaction" => Ok(Self::StartTransaction),
            "StatusNotification" => Ok(Self::StatusNotification),
            "StopTransaction" => Ok(Self::StopTransaction),
            "ChangeAvailability" => Ok(Self::ChangeAvailability),
            "ChangeConfiguration" => Ok(Self::ChangeConfiguration),
            "ClearCache" => Ok(Self::ClearCache),
            "GetConfiguration" => Ok(Self::GetConfiguration),
            "RemoteStartTransaction" => Ok(Self::RemoteStartTransaction),
            "RemoteStopTransaction" => Ok(Self::RemoteStopTransaction),
            "Reset" => Ok(Self::Reset),
            "TriggerMessage" => Ok(Self::TriggerMessage),
            "UnlockConnector" => Ok(Self::UnlockConnector),
            other => Err(format!("Unbekannte Aktion: {other}")),
        }
    }
}

/// Verbindet eine Anfrage-Struktur mit ihrer Aktion und ihrem Antwort-Schema
pub trait Anfrage: Serialize + DeserializeOwned + Send {
    /// Aktion unter der die Anfrage gesendet wird
    const ACTION: Action;
    /// Erwartetes Antwort-Schema
    type Antwort: Serialize + DeserializeOwned + Send;
}

// ---------------------------------------------------------------------------
// Gemeinsame Typen
// ---------------------------------------------------------------------------

/// Ergebnis einer Registrierung (BootNotification)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Accepted,
    Pending,
    Rejected,
}

/// Autorisierungsstatus eines IdTags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationStatus {
    Accepted,
    Blocked,
    Expired,
    Invalid,
    ConcurrentTx,
}

/// Status eines Steckers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargePointStatus {
    Available,
    Preparing,
    Charging,
    #[serde(rename = "SuspendedEVSE")]
    SuspendedEvse,
    #[serde(rename = "SuspendedEV")]
    SuspendedEv,
    Finishing,
    Reserved,
    Unavailable,
    Faulted,
}

/// Einfaches Annahme-Ergebnis fuer Kommandos an den Ladepunkt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenericStatus {
    Accepted,
    Rejected,
}

/// Ergebnis eines DataTransfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataTransferStatus {
    Accepted,
    Rejected,
    UnknownMessageId,
    UnknownVendorId,
}

/// Art des Neustarts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetType {
    Hard,
    Soft,
}

/// Nachrichten die per TriggerMessage angefordert werden koennen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageTrigger {
    BootNotification,
    DiagnosticsStatusNotification,
    FirmwareStatusNotification,
    Heartbeat,
    MeterValues,
    StatusNotification,
}

/// Ergebnis einer TriggerMessage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerMessageStatus {
    Accepted,
    Rejected,
    NotImplemented,
}

/// Autorisierungsinformation zu einem IdTag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdTagInfo {
    pub status: AuthorizationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id_tag: Option<String>,
}

impl IdTagInfo {
    /// IdTag ohne Einschraenkung akzeptiert
    pub fn akzeptiert() -> Self {
        Self {
            status: AuthorizationStatus::Accepted,
            expiry_date: None,
            parent_id_tag: None,
        }
    }
}

/// Ein einzelner Messwert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampledValue {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Messwerte zu einem Zeitpunkt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterValue {
    pub timestamp: DateTime<Utc>,
    pub sampled_value: Vec<SampledValue>,
}

/// Leere Antwort (`{}`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeereAntwort {}

// ---------------------------------------------------------------------------
// Ladepunkt -> Zentrale
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationRequest {
    pub charge_point_vendor: String,
    pub charge_point_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge_point_serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationResponse {
    pub status: RegistrationStatus,
    pub current_time: DateTime<Utc>,
    /// Heartbeat-Intervall in Sekunden
    pub interval: u32,
}

impl Anfrage for BootNotificationRequest {
    const ACTION: Action = Action::BootNotification;
    type Antwort = BootNotificationResponse;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRequest {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub current_time: DateTime<Utc>,
}

impl Anfrage for HeartbeatRequest {
    const ACTION: Action = Action::Heartbeat;
    type Antwort = HeartbeatResponse;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusNotificationRequest {
    pub connector_id: u32,
    pub error_code: String,
    pub status: ChargePointStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl Anfrage for StatusNotificationRequest {
    const ACTION: Action = Action::StatusNotification;
    type Antwort = LeereAntwort;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    pub id_tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeResponse {
    pub id_tag_info: IdTagInfo,
}

impl Anfrage for AuthorizeRequest {
    const ACTION: Action = Action::Authorize;
    type Antwort = AuthorizeResponse;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterValuesRequest {
    pub connector_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i64>,
    pub meter_value: Vec<MeterValue>,
}

impl Anfrage for MeterValuesRequest {
    const ACTION: Action = Action::MeterValues;
    type Antwort = LeereAntwort;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTransactionRequest {
    pub connector_id: u32,
    pub id_tag: String,
    pub meter_start: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTransactionResponse {
    pub id_tag_info: IdTagInfo,
    pub transaction_id: i64,
}

impl Anfrage for StartTransactionRequest {
    const ACTION: Action = Action::StartTransaction;
    type Antwort = StartTransactionResponse;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTransactionRequest {
    pub transaction_id: i64,
    pub meter_stop: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTransactionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_tag_info: Option<IdTagInfo>,
}

impl Anfrage for StopTransactionRequest {
    const ACTION: Action = Action::StopTransaction;
    type Antwort = StopTransactionResponse;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTransferRequest {
    pub vendor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTransferResponse {
    pub status: DataTransferStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Anfrage for DataTransferRequest {
    const ACTION: Action = Action::DataTransfer;
    type Antwort = DataTransferResponse;
}

// ---------------------------------------------------------------------------
// Zentrale -> Ladepunkt
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetRequest {
    #[serde(rename = "type")]
    pub typ: ResetType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusAntwort {
    pub status: GenericStatus,
}

impl Anfrage for ResetRequest {
    const ACTION: Action = Action::Reset;
    type Antwort = StatusAntwort;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerMessageRequest {
    pub requested_message: MessageTrigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerMessageResponse {
    pub status: TriggerMessageStatus,
}

impl Anfrage for TriggerMessageRequest {
    const ACTION: Action = Action::TriggerMessage;
    type Antwort = TriggerMessageResponse;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStartTransactionRequest {
    pub id_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<u32>,
}

impl Anfrage for RemoteStartTransactionRequest {
    const ACTION: Action = Action::RemoteStartTransaction;
    type Antwort = StatusAntwort;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStopTransactionRequest {
    pub transaction_id: i64,
}

impl Anfrage for RemoteStopTransactionRequest {
    const ACTION: Action = Action::RemoteStopTransaction;
    type Antwort = StatusAntwort;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn action_string_hin_und_zurueck() {
        for action in [
            Action::Authorize,
            Action::BootNotification,
            Action::RemoteStopTransaction,
            Action::UnlockConnector,
        ] {
            assert_eq!(Action::from_str(action.as_str()).unwrap(), action);
        }
    }

    #[test]
    fn unbekannte_action_wird_abgelehnt() {
        let err = Action::from_str("FlyToMoon").unwrap_err();
        assert!(err.contains("FlyToMoon"));
    }

    #[test]
    fn richtung_der_aktionen() {
        assert!(Action::Heartbeat.vom_ladepunkt());
        assert!(!Action::Reset.vom_ladepunkt());
    }

    #[test]
    fn boot_notification_camel_case() {
        let payload = json!({
            "chargePointVendor": "Elektro AG",
            "chargePointModel": "Wallbox 22"
        });
        let req: BootNotificationRequest = serde_json::from_value(payload).unwrap();
        assert_eq!(req.charge_point_vendor, "Elektro AG");
        assert!(req.firmware_version.is_none());

        let zurueck = serde_json::to_value(&req).unwrap();
        assert!(zurueck.get("firmwareVersion").is_none());
    }

    #[test]
    fn status_notification_sonderschreibweise() {
        let payload = json!({
            "connectorId": 1,
            "errorCode": "NoError",
            "status": "SuspendedEV"
        });
        let req: StatusNotificationRequest = serde_json::from_value(payload).unwrap();
        assert_eq!(req.status, ChargePointStatus::SuspendedEv);
    }

    #[test]
    fn reset_type_feld() {
        let req = ResetRequest { typ: ResetType::Soft };
        assert_eq!(serde_json::to_value(&req).unwrap(), json!({"type": "Soft"}));
    }

    #[test]
    fn schema_verletzung_wird_erkannt() {
        let payload = json!({"connectorId": "eins"});
        let ergebnis: Result<StatusNotificationRequest, _> = serde_json::from_value(payload);
        assert!(ergebnis.is_err());
    }
}
