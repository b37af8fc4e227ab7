//! High-level device interface
//!
//! `BoksDevice` owns the physical link and serializes every operation
//! behind one async mutex: overlapping logical callers are strictly
//! ordered on the wire. Responses arrive asynchronously on the notify
//! characteristic and are matched back to senders by the
//! [`Router`](crate::router::Router).

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use rand::Rng;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use boks_core::constants::{
    DEFAULT_COMMAND_TIMEOUT, DISCONNECT_SETTLE_DELAY, LOG_COUNT_CACHE_TTL,
    LOG_COUNT_COLLECT_WINDOW, LOG_FETCH_MIN_TIMEOUT, LOG_FETCH_PER_ENTRY, NFC_SCAN_RESULT_TIMEOUT,
    RETRY_BASE_DELAY, RETRY_JITTER_MS, SEND_ATTEMPTS,
};
use boks_core::{
    CODE_CHARSET, CODE_LEN, CONFIG_KEY_LEN, CodeKind, ConfigType, Frame, MasterKey,
    NotificationOpcode, derive_pin,
};
use boks_protocol::{DeviceErrorKind, LogEntry, Request, Response};
use boks_types::{BatteryStats, CodeCounts, DeviceInfo, NfcScanResult, NfcScanStatus};

use boks_transport::{Characteristic, Transport};

use crate::error::{Error, Result};
use crate::router::{Observer, ObserverId, Router, StatusCallback};

/// Identifies a stored code for deletion: master codes by slot index,
/// single/multi-use codes by their value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeId {
    Index(u8),
    Code(String),
}

struct Link {
    transport: Box<dyn Transport>,
    /// Logical callers currently holding the session open
    users: u32,
}

/// Boks parcel locker
///
/// # Examples
///
/// ```no_run
/// use boks::BoksDevice;
/// # fn transport() -> Box<dyn boks_transport::Transport> { unimplemented!() }
///
/// #[tokio::main]
/// async fn main() -> boks::Result<()> {
///     let device = BoksDevice::new(transport()).with_config_key("12345678")?;
///
///     device.connect().await?;
///     let open = device.get_door_status().await?;
///     println!("door open: {open}");
///     device.disconnect().await?;
///     Ok(())
/// }
/// ```
pub struct BoksDevice {
    link: Mutex<Link>,
    router: Arc<Router>,
    config_key: Option<String>,
    master_key: SyncMutex<Option<MasterKey>>,
    timeout: Duration,
}

impl BoksDevice {
    /// Create a device over an established transport
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            link: Mutex::new(Link { transport, users: 0 }),
            router: Arc::new(Router::new()),
            config_key: None,
            master_key: SyncMutex::new(None),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Set the 8-character config key authorizing management commands
    pub fn with_config_key(mut self, config_key: impl Into<String>) -> Result<Self> {
        let config_key = config_key.into();
        if config_key.len() != CONFIG_KEY_LEN {
            return Err(Error::Core(boks_core::Error::InvalidConfigKey {
                actual: config_key.len(),
            }));
        }
        self.config_key = Some(config_key);
        Ok(self)
    }

    /// Set the 32-byte master key (hex text) used for offline PIN derivation
    pub fn with_master_key(self, hex_key: &str) -> Result<Self> {
        *self.master_key.lock() = Some(MasterKey::parse(hex_key)?);
        Ok(self)
    }

    /// Set the per-command response timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check if the physical link is up
    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.transport.is_connected()
    }

    /// Open a logical session
    ///
    /// Only the 0→1 reference transition connects the physical link;
    /// further callers share it.
    pub async fn connect(&self) -> Result<()> {
        let mut link = self.link.lock().await;
        link.users += 1;
        debug!(users = link.users, "connect requested");

        if link.transport.is_connected() {
            return Ok(());
        }

        match self.connect_physical(&mut link).await {
            Ok(()) => Ok(()),
            Err(e) => {
                link.users -= 1;
                Err(e)
            }
        }
    }

    async fn connect_physical(&self, link: &mut Link) -> Result<()> {
        info!(peer = link.transport.peer(), "connecting");
        link.transport.connect().await?;

        let router = Arc::clone(&self.router);
        link.transport
            .subscribe(Arc::new(move |data: &[u8]| {
                router.handle_notification(data);
            }))
            .await?;

        info!(peer = link.transport.peer(), "connected");
        Ok(())
    }

    /// Close a logical session
    ///
    /// The physical disconnect happens only when the last reference is
    /// released, after the settle delay and the deferred refresh.
    pub async fn disconnect(&self) -> Result<()> {
        let mut link = self.link.lock().await;
        if link.users > 0 {
            link.users -= 1;
        }
        debug!(users = link.users, "disconnect requested");

        if link.users > 0 {
            return Ok(());
        }

        if !link.transport.is_connected() {
            return Ok(());
        }

        // Let the device finish flash writes and battery stabilization
        // after a recent door event before tearing the link down
        if let Some(age) = self.router.last_door_event_age() {
            if age < DISCONNECT_SETTLE_DELAY {
                let wait = DISCONNECT_SETTLE_DELAY - age;
                debug!(?wait, "settling before disconnect");
                sleep(wait).await;
            }
        }

        if self.router.take_refresh_needed() {
            if let Err(e) = self.final_refresh(&mut link).await {
                warn!("final refresh failed: {e}");
            }
        }

        link.transport.disconnect().await?;
        info!("disconnected");
        Ok(())
    }

    /// Refresh battery state and the pending-log count before the link
    /// goes away; results reach the embedder via the status callback
    async fn final_refresh(&self, link: &mut Link) -> Result<()> {
        debug!("running final refresh before disconnect");

        let level = self.read_battery_level(link).await?;
        let temperature = self
            .read_battery_stats(link)
            .await
            .ok()
            .flatten()
            .and_then(|stats| stats.temperature());
        self.router
            .publish_battery(level, temperature);

        // Nudges the device into reporting its stored-log count; the
        // answer lands in the cache and the status callback
        self.send_locked(link, &Request::GetLogsCount, &[], self.timeout)
            .await?;
        sleep(LOG_COUNT_COLLECT_WINDOW).await;

        Ok(())
    }

    /// Zero the reference count, cancel all outstanding correlations and
    /// tear down the physical link. For unrecoverable transport errors.
    pub async fn force_reset(&self) -> Result<()> {
        let mut link = self.link.lock().await;
        self.force_reset_locked(&mut link).await;
        Ok(())
    }

    async fn force_reset_locked(&self, link: &mut Link) {
        warn!("forcing session reset");
        link.users = 0;
        self.router.cancel_correlations();
        if link.transport.is_connected() {
            if let Err(e) = link.transport.disconnect().await {
                warn!("disconnect during reset failed: {e}");
            }
        }
    }

    /// Send a request, optionally awaiting one of `awaited` opcodes
    ///
    /// Transport faults are retried once after a forced reset plus a
    /// jittered delay. Timeouts and device-reported errors propagate
    /// immediately.
    pub async fn send_request(
        &self,
        request: &Request,
        awaited: &[NotificationOpcode],
        timeout: Duration,
    ) -> Result<Option<Frame>> {
        let mut link = self.link.lock().await;
        let mut last_error = None;

        for attempt in 1..=SEND_ATTEMPTS {
            if attempt > 1 {
                self.force_reset_locked(&mut link).await;
                let jitter = rand::thread_rng().gen_range(0..RETRY_JITTER_MS);
                let delay = RETRY_BASE_DELAY + Duration::from_millis(jitter);
                debug!(attempt, ?delay, "retrying after transport fault");
                sleep(delay).await;
            }

            match self.send_locked(&mut link, request, awaited, timeout).await {
                Ok(frame) => return Ok(frame),
                Err(e) if e.is_transport_fault() => {
                    warn!(attempt, "transport fault: {e}");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(Error::Transport(boks_transport::Error::LinkDropped)))
    }

    async fn send_locked(
        &self,
        link: &mut Link,
        request: &Request,
        awaited: &[NotificationOpcode],
        timeout_after: Duration,
    ) -> Result<Option<Frame>> {
        if !link.transport.is_connected() {
            self.connect_physical(link).await?;
        }

        let frame = request.to_frame();
        let encoded = frame.encode()?;
        debug!(
            opcode = %request.opcode(),
            payload = request.describe(),
            "TX"
        );

        let rx = if awaited.is_empty() {
            None
        } else {
            let opcodes: Vec<u8> = awaited.iter().map(|op| *op as u8).collect();
            Some(self.router.register_correlation(&opcodes))
        };

        link.transport
            .write(Characteristic::Command, &encoded)
            .await?;

        let Some(rx) = rx else {
            return Ok(None);
        };

        match timeout(timeout_after, rx).await {
            Ok(Ok(frame)) => Ok(Some(frame)),
            // Correlation dropped by a concurrent forced reset
            Ok(Err(_)) => Err(Error::Transport(boks_transport::Error::LinkDropped)),
            Err(_) => Err(Error::Timeout {
                opcode: u8::from(request.opcode()),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Door
    // ------------------------------------------------------------------

    /// Open the door
    ///
    /// With `code = None` the master code for slot 0 is derived from the
    /// configured master key.
    pub async fn open_door(&self, code: Option<&str>) -> Result<()> {
        let pin = match code {
            Some(code) => normalize_pin(code)?,
            None => self.derive_pin(CodeKind::Master, 0)?,
        };

        let reply = self
            .send_request(
                &Request::OpenDoor { pin },
                &[
                    NotificationOpcode::ValidOpenCode,
                    NotificationOpcode::InvalidOpenCode,
                    NotificationOpcode::ErrorUnauthorized,
                ],
                self.timeout,
            )
            .await?;

        match decode_reply(reply)? {
            Response::OpenCodeResult { valid: true } => Ok(()),
            Response::OpenCodeResult { valid: false } => Err(Error::CodeRejected),
            Response::DeviceError(DeviceErrorKind::Unauthorized) => Err(Error::Unauthorized),
            other => Err(unexpected(other)),
        }
    }

    /// Poll the current door status; `true` means open
    pub async fn get_door_status(&self) -> Result<bool> {
        let reply = self
            .send_request(
                &Request::AskDoorStatus,
                &[
                    NotificationOpcode::NotifyDoorStatus,
                    NotificationOpcode::AnswerDoorStatus,
                ],
                self.timeout,
            )
            .await?;

        match decode_reply(reply)? {
            Response::DoorStatus { open, .. } => Ok(open),
            other => Err(unexpected(other)),
        }
    }

    // ------------------------------------------------------------------
    // Code management
    // ------------------------------------------------------------------

    /// Create a PIN code on the device and return it
    ///
    /// With `code = None` a random code over the keypad charset is
    /// generated. `index` is only meaningful for master codes.
    pub async fn create_pin_code(
        &self,
        code: Option<&str>,
        kind: CodeKind,
        index: u8,
    ) -> Result<String> {
        let config_key = self.config_key()?;
        let pin = match code {
            Some(code) => normalize_pin(code)?,
            None => random_pin(),
        };

        let request = match kind {
            CodeKind::Master => Request::CreateMasterCode {
                config_key,
                index,
                pin: pin.clone(),
            },
            CodeKind::SingleUse => Request::CreateSingleUseCode {
                config_key,
                pin: pin.clone(),
            },
            CodeKind::MultiUse => Request::CreateMultiUseCode {
                config_key,
                pin: pin.clone(),
            },
        };

        self.expect_operation_result(&request, "create code").await?;
        debug!(kind = %kind, "code created");
        Ok(pin)
    }

    /// Replace the master code stored at `index`
    pub async fn change_master_code(&self, new_code: &str, index: u8) -> Result<()> {
        let request = Request::EditMasterCode {
            config_key: self.config_key()?,
            index,
            pin: normalize_pin(new_code)?,
        };
        self.expect_operation_result(&request, "change master code")
            .await
    }

    /// Delete a stored code
    ///
    /// Some firmware revisions report an error for a single-use deletion
    /// that actually succeeded; for those the code counts are compared
    /// around the operation and a decreased count overrides the error.
    pub async fn delete_pin_code(&self, kind: CodeKind, id: CodeId) -> Result<()> {
        let config_key = self.config_key()?;

        let request = match (kind, id) {
            (CodeKind::Master, CodeId::Index(index)) => {
                Request::DeleteMasterCode { config_key, index }
            }
            (CodeKind::SingleUse, CodeId::Code(code)) => Request::DeleteSingleUseCode {
                config_key,
                code: normalize_pin(&code)?,
            },
            (CodeKind::MultiUse, CodeId::Code(code)) => Request::DeleteMultiUseCode {
                config_key,
                code: normalize_pin(&code)?,
            },
            (kind, id) => {
                return Err(Error::Input(format!(
                    "{kind} codes cannot be deleted by {id:?}"
                )));
            }
        };

        let counts_before = if kind == CodeKind::SingleUse {
            self.get_code_counts().await.ok()
        } else {
            None
        };

        match self.expect_operation_result(&request, "delete code").await {
            Ok(()) => Ok(()),
            Err(Error::OperationFailed { .. }) if counts_before.is_some() => {
                let before = counts_before.unwrap_or_default();
                let after = self.get_code_counts().await?;
                if after.single_use < before.single_use {
                    warn!(
                        before = before.single_use,
                        after = after.single_use,
                        "device reported delete failure but the count decreased; treating as success"
                    );
                    Ok(())
                } else {
                    Err(Error::OperationFailed {
                        operation: "delete code",
                    })
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Convert a code between single-use and multi-use
    pub async fn convert_code(&self, code: &str, to: CodeKind) -> Result<()> {
        let config_key = self.config_key()?;
        let code = normalize_pin(code)?;

        let request = match to {
            CodeKind::MultiUse => Request::ConvertToMultiUse { config_key, code },
            CodeKind::SingleUse => Request::ConvertToSingleUse { config_key, code },
            CodeKind::Master => {
                return Err(Error::Input("codes cannot be converted to master".into()));
            }
        };
        self.expect_operation_result(&request, "convert code").await
    }

    /// Reactivate a spent single-use code
    pub async fn reactivate_code(&self, code: &str) -> Result<()> {
        let request = Request::ReactivateCode {
            config_key: self.config_key()?,
            code: normalize_pin(code)?,
        };
        self.expect_operation_result(&request, "reactivate code")
            .await
    }

    /// Counts of codes currently stored on the device
    pub async fn get_code_counts(&self) -> Result<CodeCounts> {
        let reply = self
            .send_request(
                &Request::CountCodes,
                &[NotificationOpcode::NotifyCodesCount],
                self.timeout,
            )
            .await?;

        match decode_reply(reply)? {
            Response::CodesCount(counts) => Ok(counts),
            other => Err(unexpected(other)),
        }
    }

    // ------------------------------------------------------------------
    // Logs
    // ------------------------------------------------------------------

    /// Number of history entries stored on the device
    ///
    /// The device may push an initial count followed by a correction, so
    /// same-opcode pushes are collected for a short window and the
    /// maximum wins. A short-lived cache absorbs immediate repeat calls.
    pub async fn get_logs_count(&self) -> Result<u16> {
        if let Some(count) = self.router.cached_log_count(LOG_COUNT_CACHE_TTL) {
            debug!(count, "logs count served from cache");
            return Ok(count);
        }

        let values = Arc::new(SyncMutex::new(Vec::new()));
        let sink = values.clone();
        let observer_id = self.router.register_observer(
            NotificationOpcode::NotifyLogsCount as u8,
            Arc::new(move |frame: &Frame| {
                if let Response::LogsCount { count } = Response::decode(frame) {
                    sink.lock().push(count);
                }
            }),
        );

        let result = async {
            // Await the first count, then keep collecting corrections
            self.send_request(
                &Request::GetLogsCount,
                &[NotificationOpcode::NotifyLogsCount],
                self.timeout,
            )
            .await?;
            sleep(LOG_COUNT_COLLECT_WINDOW).await;
            Ok::<(), Error>(())
        }
        .await;

        self.router.unregister_observer(observer_id);
        result?;

        let count = values.lock().iter().copied().max().unwrap_or(0);
        debug!(count, "logs count stabilized");
        Ok(count)
    }

    /// Retrieve the stored history, oldest first
    ///
    /// `count` skips the separate count query when the caller already
    /// knows how many entries to expect.
    pub async fn get_logs(&self, count: Option<u16>) -> Result<Vec<LogEntry>> {
        let count = match count {
            Some(count) => count,
            None => self.get_logs_count().await?,
        };
        if count == 0 {
            return Ok(Vec::new());
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        if !self.router.claim_log_sink(tx) {
            return Err(Error::Busy("another log retrieval is in progress"));
        }

        let deadline = LOG_FETCH_MIN_TIMEOUT.max(LOG_FETCH_PER_ENTRY * u32::from(count));
        let mut entries = Vec::with_capacity(usize::from(count));

        let outcome = async {
            self.send_request(&Request::RequestLogs, &[], self.timeout)
                .await?;

            let collect = async {
                while let Some(entry) = rx.recv().await {
                    if entry.event == boks_core::HistoryEvent::EndHistory {
                        break;
                    }
                    entries.push(entry);
                }
            };

            if timeout(deadline, collect).await.is_err() {
                warn!(
                    received = entries.len(),
                    expected = count,
                    "log retrieval timed out"
                );
            }
            Ok::<(), Error>(())
        }
        .await;

        self.router.release_log_sink();
        outcome?;

        entries.sort_by_key(|entry| entry.timestamp);
        info!(count = entries.len(), "history retrieved");
        Ok(entries)
    }

    // ------------------------------------------------------------------
    // Battery and device information
    // ------------------------------------------------------------------

    /// Battery level in percent
    pub async fn get_battery_level(&self) -> Result<u8> {
        let mut link = self.link.lock().await;
        self.read_battery_level(&mut link).await
    }

    async fn read_battery_level(&self, link: &mut Link) -> Result<u8> {
        if !link.transport.is_connected() {
            self.connect_physical(link).await?;
        }
        let payload = link.transport.read(Characteristic::BatteryLevel).await?;
        Ok(payload.first().copied().unwrap_or(0))
    }

    /// Extended battery statistics, when the firmware provides them
    pub async fn get_battery_stats(&self) -> Result<Option<BatteryStats>> {
        let mut link = self.link.lock().await;
        self.read_battery_stats(&mut link).await
    }

    async fn read_battery_stats(&self, link: &mut Link) -> Result<Option<BatteryStats>> {
        if !link.transport.is_connected() {
            self.connect_physical(link).await?;
        }
        let payload = link.transport.read(Characteristic::BatteryStats).await?;
        Ok(BatteryStats::parse(&payload))
    }

    /// Read the GATT device-information characteristics
    ///
    /// Unreadable characteristics yield `None` fields rather than an
    /// error; devices differ in which ones they expose.
    pub async fn get_device_information(&self) -> Result<DeviceInfo> {
        let mut link = self.link.lock().await;
        if !link.transport.is_connected() {
            self.connect_physical(&mut link).await?;
        }

        let mut info = DeviceInfo::default();
        info.system_id = self
            .read_string(&mut link, Characteristic::SystemId, true)
            .await;
        info.model_number = self
            .read_string(&mut link, Characteristic::ModelNumber, false)
            .await;
        info.serial_number = self
            .read_string(&mut link, Characteristic::SerialNumber, false)
            .await;
        info.firmware_revision = self
            .read_string(&mut link, Characteristic::FirmwareRevision, false)
            .await;
        info.hardware_revision = self
            .read_string(&mut link, Characteristic::HardwareRevision, false)
            .await;
        info.software_revision = self
            .read_string(&mut link, Characteristic::SoftwareRevision, false)
            .await;
        info.manufacturer_name = self
            .read_string(&mut link, Characteristic::ManufacturerName, false)
            .await;

        Ok(info)
    }

    async fn read_string(
        &self,
        link: &mut Link,
        characteristic: Characteristic,
        as_hex: bool,
    ) -> Option<String> {
        match link.transport.read(characteristic).await {
            Ok(payload) if as_hex => Some(hex::encode(payload)),
            Ok(payload) => match String::from_utf8(payload) {
                Ok(text) => Some(text),
                Err(_) => None,
            },
            Err(e) => {
                debug!(%characteristic, "read failed: {e}");
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Configuration and NFC
    // ------------------------------------------------------------------

    /// Toggle a device configuration flag
    pub async fn set_configuration(&self, config: ConfigType, enabled: bool) -> Result<()> {
        let request = Request::SetConfiguration {
            config_key: self.config_key()?,
            config,
            enabled,
        };

        let reply = self
            .send_request(
                &request,
                &[
                    NotificationOpcode::NotifySetConfigurationSuccess,
                    NotificationOpcode::ErrorUnauthorized,
                    NotificationOpcode::ErrorBadRequest,
                ],
                self.timeout,
            )
            .await?;

        match decode_reply(reply)? {
            Response::ConfigurationSet => Ok(()),
            Response::DeviceError(DeviceErrorKind::Unauthorized) => Err(Error::Unauthorized),
            Response::DeviceError(kind) => Err(Error::Device(kind)),
            other => Err(unexpected(other)),
        }
    }

    /// Put the device into NFC scanning mode
    ///
    /// Follow up with [`wait_nfc_scan_result`](Self::wait_nfc_scan_result)
    /// to learn what the device saw.
    pub async fn start_nfc_scan(&self) -> Result<()> {
        let request = Request::NfcScanStart {
            config_key: self.config_key()?,
        };
        self.expect_operation_result(&request, "start NFC scan").await
    }

    /// Wait for the outcome of a running NFC scan session
    pub async fn wait_nfc_scan_result(&self) -> Result<NfcScanResult> {
        let rx = self.router.register_correlation(&[
            NotificationOpcode::NotifyNfcTagFound as u8,
            NotificationOpcode::ErrorNfcTagAlreadyExists as u8,
            NotificationOpcode::ErrorNfcScanTimeout as u8,
        ]);

        let frame = match timeout(NFC_SCAN_RESULT_TIMEOUT, rx).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(_)) => return Err(Error::Transport(boks_transport::Error::LinkDropped)),
            // The device itself reports 0xC7 on its own timeout; hitting
            // ours means the link went quiet entirely
            Err(_) => {
                return Ok(NfcScanResult {
                    status: NfcScanStatus::Timeout,
                    uid: None,
                });
            }
        };

        match Response::decode(&frame) {
            Response::NfcScan(result) => Ok(result),
            other => Err(unexpected(other)),
        }
    }

    /// Add an NFC tag UID to the device whitelist
    pub async fn register_nfc_tag(&self, uid: &str) -> Result<()> {
        let request = Request::RegisterNfcTag {
            config_key: self.config_key()?,
            uid: parse_uid(uid)?,
        };

        let reply = self
            .send_request(
                &request,
                &[
                    NotificationOpcode::NotifyNfcTagRegistered,
                    NotificationOpcode::ErrorNfcTagAlreadyExists,
                    NotificationOpcode::ErrorUnauthorized,
                ],
                self.timeout,
            )
            .await?;

        match decode_reply(reply)? {
            Response::NfcTagRegistered => Ok(()),
            Response::NfcScan(_) => Err(Error::OperationFailed {
                operation: "register NFC tag: already registered",
            }),
            Response::DeviceError(DeviceErrorKind::Unauthorized) => Err(Error::Unauthorized),
            other => Err(unexpected(other)),
        }
    }

    /// Remove an NFC tag UID from the device whitelist
    pub async fn unregister_nfc_tag(&self, uid: &str) -> Result<()> {
        let request = Request::UnregisterNfcTag {
            config_key: self.config_key()?,
            uid: parse_uid(uid)?,
        };
        self.expect_operation_result(&request, "unregister NFC tag")
            .await
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Reboot the device; it drops the link on its own afterwards
    pub async fn reboot(&self) -> Result<()> {
        warn!("rebooting device");
        self.send_request(&Request::Reboot, &[], self.timeout)
            .await?;
        Ok(())
    }

    /// Trigger a battery measurement cycle
    pub async fn test_battery(&self) -> Result<()> {
        self.send_request(&Request::TestBattery, &[], self.timeout)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Callbacks and derivation
    // ------------------------------------------------------------------

    /// Install the status-update callback
    pub fn register_status_callback(&self, callback: StatusCallback) {
        self.router.set_status_callback(callback);
    }

    /// Register an observer for one notification opcode
    pub fn register_observer(&self, opcode: u8, observer: Observer) -> ObserverId {
        self.router.register_observer(opcode, observer)
    }

    /// Remove a previously registered observer
    pub fn unregister_observer(&self, id: ObserverId) {
        self.router.unregister_observer(id);
    }

    /// Most recently observed door state without touching the link
    pub fn last_known_door_open(&self) -> bool {
        self.router.door_open()
    }

    /// Derive a PIN offline from the configured master key
    pub fn derive_pin(&self, kind: CodeKind, index: u32) -> Result<String> {
        let guard = self.master_key.lock();
        let key = guard
            .as_ref()
            .ok_or(Error::Core(boks_core::Error::MasterKeyMissing))?;
        Ok(derive_pin(key, kind, index))
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn config_key(&self) -> Result<String> {
        self.config_key.clone().ok_or(Error::ConfigKeyRequired)
    }

    /// Send a request answered by the operation-result pair (0x77/0x78)
    async fn expect_operation_result(
        &self,
        request: &Request,
        operation: &'static str,
    ) -> Result<()> {
        let reply = self
            .send_request(
                request,
                &[
                    NotificationOpcode::CodeOperationSuccess,
                    NotificationOpcode::CodeOperationError,
                    NotificationOpcode::ErrorUnauthorized,
                ],
                self.timeout,
            )
            .await?;

        match decode_reply(reply)? {
            Response::OperationResult { success: true } => Ok(()),
            Response::OperationResult { success: false } => {
                Err(Error::OperationFailed { operation })
            }
            Response::DeviceError(DeviceErrorKind::Unauthorized) => Err(Error::Unauthorized),
            other => Err(unexpected(other)),
        }
    }
}

fn decode_reply(reply: Option<Frame>) -> Result<Response> {
    let frame = reply.ok_or(Error::Transport(boks_transport::Error::LinkDropped))?;
    Ok(Response::decode(&frame))
}

fn unexpected(response: Response) -> Error {
    Error::Input(format!("unexpected reply: {}", response.event_type()))
}

/// Normalize and validate a keypad code
fn normalize_pin(code: &str) -> Result<String> {
    let code = code.trim().to_uppercase();
    if code.len() != CODE_LEN || !code.chars().all(|c| CODE_CHARSET.contains(c)) {
        return Err(Error::Core(boks_core::Error::InvalidCodeFormat {
            code: "*".repeat(code.len()),
        }));
    }
    Ok(code)
}

/// Random keypad code over the device charset
fn random_pin() -> String {
    let charset = CODE_CHARSET.as_bytes();
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| charset[rng.gen_range(0..charset.len())] as char)
        .collect()
}

/// Parse a tag UID from hex text, tolerating `:` and space separators
fn parse_uid(uid: &str) -> Result<Vec<u8>> {
    let cleaned: String = uid.chars().filter(|c| !matches!(c, ':' | ' ')).collect();
    let bytes = hex::decode(&cleaned).map_err(|_| {
        Error::Core(boks_core::Error::InvalidTagUid { uid: uid.into() })
    })?;
    if bytes.is_empty() {
        return Err(Error::Core(boks_core::Error::InvalidTagUid {
            uid: uid.into(),
        }));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_pin() {
        assert_eq!(normalize_pin(" 0123ab ").unwrap(), "0123AB");
        assert!(normalize_pin("12345").is_err());
        assert!(normalize_pin("12345Z").is_err());
        assert!(normalize_pin("1234567").is_err());
    }

    #[test]
    fn test_random_pin_shape() {
        for _ in 0..32 {
            let pin = random_pin();
            assert_eq!(pin.len(), CODE_LEN);
            assert!(pin.chars().all(|c| CODE_CHARSET.contains(c)));
        }
    }

    #[test]
    fn test_parse_uid() {
        assert_eq!(parse_uid("5A:3E:DA:E0").unwrap(), vec![0x5A, 0x3E, 0xDA, 0xE0]);
        assert_eq!(parse_uid("5a 3e da e0").unwrap(), vec![0x5A, 0x3E, 0xDA, 0xE0]);
        assert!(parse_uid("xyz").is_err());
        assert!(parse_uid("").is_err());
    }

    use boks_transport::testing::{frame, Script, ScriptedTransport};

    fn scripted_device() -> (BoksDevice, Script) {
        let (transport, script) = ScriptedTransport::new();
        let device = BoksDevice::new(Box::new(transport))
            .with_config_key("12345678")
            .unwrap();
        (device, script)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_reference_counting() {
        let (device, script) = scripted_device();

        device.connect().await.unwrap();
        device.connect().await.unwrap();
        assert_eq!(script.connect_count(), 1);

        device.disconnect().await.unwrap();
        assert!(script.is_connected());
        assert_eq!(script.disconnect_count(), 0);

        device.disconnect().await.unwrap();
        assert!(!script.is_connected());
        assert_eq!(script.disconnect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_door_wire_format() {
        let (device, script) = scripted_device();
        script.reply_to(0x01, vec![frame(0x81, &[])]);

        device.connect().await.unwrap();
        device.open_door(Some("0123AB")).await.unwrap();

        let writes = script.writes();
        assert_eq!(hex::encode(&writes[0].1), "010630313233414250");
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_master_code_wire_format() {
        let (device, script) = scripted_device();
        script.reply_to(0x11, vec![frame(0x77, &[])]);

        device.connect().await.unwrap();
        let pin = device
            .create_pin_code(Some("123456"), CodeKind::Master, 1)
            .await
            .unwrap();

        assert_eq!(pin, "123456");
        let writes = script.writes();
        assert_eq!(
            hex::encode(&writes[0].1),
            "110f313233343536373801313233343536fa"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_door_rejected() {
        let (device, script) = scripted_device();
        script.reply_to(0x01, vec![frame(0x82, &[])]);

        device.connect().await.unwrap();
        let err = device.open_door(Some("0123AB")).await.unwrap_err();
        assert!(matches!(err, Error::CodeRejected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_fault_retried_exactly_once() {
        let (device, script) = scripted_device();
        script.fail_next_writes(2);

        device.connect().await.unwrap();
        let err = device.get_door_status().await.unwrap_err();

        assert!(err.is_transport_fault());
        // One reset between attempts: reconnect once, no third try
        assert_eq!(script.connect_count(), 2);
        assert_eq!(script.disconnect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_after_single_fault() {
        let (device, script) = scripted_device();
        script.fail_next_writes(1);
        script.reply_to(0x02, vec![frame(0x85, &[0x01, 0x00])]);

        device.connect().await.unwrap();
        let open = device.get_door_status().await.unwrap();
        assert!(!open);
        assert_eq!(script.connect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_not_retried() {
        let (device, script) = scripted_device();
        // No reply scripted: the wait expires

        device.connect().await.unwrap();
        let err = device.get_door_status().await.unwrap_err();

        assert!(matches!(err, Error::Timeout { opcode: 0x02 }));
        assert_eq!(script.command_opcodes(), vec![0x02]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_propagates() {
        let (device, script) = scripted_device();
        script.reply_to(0x16, vec![frame(0xE1, &[])]);

        device.connect().await.unwrap();
        let err = device
            .set_configuration(ConfigType::ScanLaposteNfcTags, true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_key_required() {
        let (transport, _script) = ScriptedTransport::new();
        let device = BoksDevice::new(Box::new(transport));

        let err = device
            .create_pin_code(None, CodeKind::SingleUse, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConfigKeyRequired));
    }

    #[tokio::test(start_paused = true)]
    async fn test_logs_count_takes_maximum() {
        let (device, script) = scripted_device();
        // Initial zero followed by the corrected count
        script.reply_to(
            0x07,
            vec![frame(0x79, &[0x00, 0x00]), frame(0x79, &[0x00, 0x03])],
        );

        device.connect().await.unwrap();
        assert_eq!(device.get_logs_count().await.unwrap(), 3);

        // Second call is served from the cache, no second query
        assert_eq!(device.get_logs_count().await.unwrap(), 3);
        assert_eq!(script.command_opcodes(), vec![0x07]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_logs_sorted_oldest_first() {
        let (device, script) = scripted_device();
        script.reply_to(
            0x03,
            vec![
                frame(0x90, &[0x00, 0x00, 0x0A]), // closed 10s ago
                frame(0x91, &[0x00, 0x00, 0x3C]), // opened 60s ago
                frame(0x92, &[0x00, 0x00, 0x00]),
            ],
        );

        device.connect().await.unwrap();
        let logs = device.get_logs(Some(2)).await.unwrap();

        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].event, boks_core::HistoryEvent::DoorOpened);
        assert_eq!(logs[1].event, boks_core::HistoryEvent::DoorClosed);
        assert!(logs[0].timestamp <= logs[1].timestamp);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_workaround_single_use() {
        let (device, script) = scripted_device();
        // Count before: 5 single-use. Delete reports an error, but the
        // count afterwards dropped to 4: treated as success.
        script.reply_to(0x14, vec![frame(0xC3, &[0x00, 0x01, 0x00, 0x05])]);
        script.reply_to(0x0D, vec![frame(0x78, &[])]);
        script.reply_to(0x14, vec![frame(0xC3, &[0x00, 0x01, 0x00, 0x04])]);

        device.connect().await.unwrap();
        device
            .delete_pin_code(CodeKind::SingleUse, CodeId::Code("123456".into()))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_failure_without_count_change() {
        let (device, script) = scripted_device();
        script.reply_to(0x14, vec![frame(0xC3, &[0x00, 0x01, 0x00, 0x05])]);
        script.reply_to(0x0D, vec![frame(0x78, &[])]);
        script.reply_to(0x14, vec![frame(0xC3, &[0x00, 0x01, 0x00, 0x05])]);

        device.connect().await.unwrap();
        let err = device
            .delete_pin_code(CodeKind::SingleUse, CodeId::Code("123456".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OperationFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_master_never_uses_workaround() {
        let (device, script) = scripted_device();
        script.reply_to(0x0C, vec![frame(0x78, &[])]);

        device.connect().await.unwrap();
        let err = device
            .delete_pin_code(CodeKind::Master, CodeId::Index(1))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::OperationFailed { .. }));
        // No count queries around a master deletion
        assert_eq!(script.command_opcodes(), vec![0x0C]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_refresh_on_disconnect_after_door_event() {
        let (device, script) = scripted_device();
        script.set_read(Characteristic::BatteryLevel, vec![87]);
        script.reply_to(0x07, vec![frame(0x79, &[0x00, 0x02])]);

        device.connect().await.unwrap();
        // Fresh door event flags the session for a refresh
        script.push_notification(&frame(0x84, &[0x00, 0x01]));
        assert!(device.last_known_door_open());

        device.disconnect().await.unwrap();

        // Refresh queried the log count before the link went down
        assert_eq!(script.command_opcodes(), vec![0x07]);
        assert_eq!(script.disconnect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_defers_after_fresh_door_event() {
        let (device, script) = scripted_device();
        script.set_read(Characteristic::BatteryLevel, vec![90]);

        device.connect().await.unwrap();
        script.push_notification(&frame(0x84, &[0x00, 0x01]));

        let before = tokio::time::Instant::now();
        device.disconnect().await.unwrap();

        // The physical disconnect waits out the settle window first
        assert!(before.elapsed() >= Duration::from_millis(4900));
        assert_eq!(script.disconnect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_plain_disconnect_skips_refresh() {
        let (device, script) = scripted_device();

        device.connect().await.unwrap();
        device.disconnect().await.unwrap();

        assert!(script.command_opcodes().is_empty());
        assert_eq!(script.disconnect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nfc_scan_result() {
        let (device, script) = scripted_device();
        device.connect().await.unwrap();

        let (result, ()) = tokio::join!(device.wait_nfc_scan_result(), async {
            tokio::task::yield_now().await;
            script.push_notification(&frame(0xC5, &[0x04, 0x5A, 0x3E, 0xDA, 0xE0]));
        });

        let result = result.unwrap();
        assert_eq!(result.status, NfcScanStatus::Found);
        assert_eq!(result.uid.as_deref(), Some("5A3EDAE0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_callback_reports_pushes() {
        let (device, script) = scripted_device();
        let updates = Arc::new(SyncMutex::new(Vec::new()));

        let sink = updates.clone();
        device.register_status_callback(Arc::new(move |update| sink.lock().push(update)));

        device.connect().await.unwrap();
        script.push_notification(&frame(0x84, &[0x01, 0x00]));

        assert_eq!(
            updates.lock().as_slice(),
            &[boks_types::StatusUpdate::Door { open: false }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_reset_cancels_waiters() {
        let (device, script) = scripted_device();
        device.connect().await.unwrap();

        let (result, ()) = tokio::join!(device.wait_nfc_scan_result(), async {
            tokio::task::yield_now().await;
            device.force_reset().await.unwrap();
        });

        assert!(matches!(
            result.unwrap_err(),
            Error::Transport(boks_transport::Error::LinkDropped)
        ));
        assert!(!script.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_door_without_code_derives_master() {
        let (transport, script) = ScriptedTransport::new();
        let device = BoksDevice::new(Box::new(transport))
            .with_master_key(
                "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f",
            )
            .unwrap();
        script.reply_to(0x01, vec![frame(0x81, &[])]);

        device.connect().await.unwrap();
        device.open_door(None).await.unwrap();

        // Master slot 0 for this key derives to A03260
        let writes = script.writes();
        assert_eq!(&writes[0].1[2..8], b"A03260");
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_information_tolerates_missing_fields() {
        let (device, script) = scripted_device();
        script.set_read(Characteristic::SerialNumber, b"BX1234".to_vec());
        script.set_read(Characteristic::SystemId, vec![0xDE, 0xAD]);

        device.connect().await.unwrap();
        let info = device.get_device_information().await.unwrap();

        assert_eq!(info.serial_number.as_deref(), Some("BX1234"));
        assert_eq!(info.system_id.as_deref(), Some("dead"));
        assert!(info.model_number.is_none());
    }
}
