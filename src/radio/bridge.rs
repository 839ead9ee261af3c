//! Radio adapter over an external bridge process
//!
//! Spawns the bridge (for example a serial-attached transceiver helper) and
//! speaks a line protocol with it:
//!
//! To the bridge:
//! - `INIT <modulation>`
//! - `FILTER <addr> [<addr>...]` (hex)
//! - `TX <dst> <payload>` (hex)
//!
//! From the bridge:
//! - `*<dst><payload>;<rssi>` a received frame, hex bytes then signed dBm
//! - `!<reason>` a failed receive
//! - anything else is logged as bridge output

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use tracing::{debug, error, info, warn};

use super::{Modulation, RadioError, RadioLink, RxCallback, RxError, RxFrame, RxResult, TxFrame};

/// State shared with the stdout reader thread
#[derive(Default)]
struct BridgeShared {
    armed: Mutex<Option<RxCallback>>,
    filter: Mutex<Vec<u8>>,
    initialized: AtomicBool,
    closed: AtomicBool,
    frames_received: AtomicU64,
    dropped_idle: AtomicU64,
    dropped_filtered: AtomicU64,
}

impl BridgeShared {
    fn armed(&self) -> MutexGuard<'_, Option<RxCallback>> {
        self.armed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn filter(&self) -> MutexGuard<'_, Vec<u8>> {
        self.filter.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store the receive callback unless the bridge has gone away.
    ///
    /// `closed` is read under the `armed` lock so a callback can never be
    /// stored after the reader has drained it on EOF.
    fn arm(&self, on_complete: RxCallback) -> Result<(), RadioError> {
        let mut armed = self.armed();
        if self.closed.load(Ordering::SeqCst) {
            return Err(RadioError::Closed);
        }
        if armed.is_some() {
            return Err(RadioError::AlreadyArmed);
        }
        *armed = Some(on_complete);
        Ok(())
    }

    /// Mark the bridge closed and hand back any outstanding callback
    fn close(&self) -> Option<RxCallback> {
        let mut armed = self.armed();
        self.closed.store(true, Ordering::SeqCst);
        armed.take()
    }

    fn complete(&self, result: RxResult) {
        let callback = self.armed().take();
        match callback {
            Some(cb) => cb(result),
            None => {
                // Nothing armed: the radio is not listening
                self.dropped_idle.fetch_add(1, Ordering::Relaxed);
                debug!("Bridge: completion while idle, dropped");
            }
        }
    }
}

/// Parsed line from the bridge's stdout
#[derive(Debug, Clone, PartialEq, Eq)]
enum BridgeLine {
    Frame(RxFrame),
    Failure(RxError),
}

/// Radio link backed by a bridge subprocess
pub struct BridgeRadio {
    command: String,
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    shared: Arc<BridgeShared>,
}

impl BridgeRadio {
    /// Spawn the bridge from a whitespace-separated command line
    pub fn spawn(command_line: &str) -> Result<Self, RadioError> {
        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| RadioError::Rejected("empty bridge command".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        info!("Executing radio bridge: {:?}", cmd);

        let mut child = cmd.spawn()?;
        let stdin = child.stdin.take().ok_or(RadioError::Closed)?;
        let stdout = child.stdout.take().ok_or(RadioError::Closed)?;

        // Spawn stderr reader for logging
        if let Some(stderr) = child.stderr.take() {
            thread::Builder::new()
                .name("bridge-stderr".to_string())
                .spawn(move || {
                    let reader = BufReader::new(stderr);
                    for line in reader.lines().map_while(Result::ok) {
                        if !line.trim().is_empty() {
                            info!("[bridge] {}", line.trim());
                        }
                    }
                })?;
        }

        let shared = Arc::new(BridgeShared::default());
        let reader_shared = shared.clone();
        thread::Builder::new()
            .name("bridge-rx".to_string())
            .spawn(move || run_reader(stdout, reader_shared))?;

        Ok(Self {
            command: command_line.to_string(),
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            shared,
        })
    }

    fn send_line(&self, line: &str) -> Result<(), RadioError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(RadioError::Closed);
        }
        let mut stdin = self.stdin.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(stdin, "{}", line)?;
        stdin.flush()?;
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<(), RadioError> {
        if !self.shared.initialized.load(Ordering::SeqCst) {
            return Err(RadioError::NotInitialized);
        }
        Ok(())
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn frames_received(&self) -> u64 {
        self.shared.frames_received.load(Ordering::Relaxed)
    }

    pub fn dropped_idle(&self) -> u64 {
        self.shared.dropped_idle.load(Ordering::Relaxed)
    }

    pub fn dropped_filtered(&self) -> u64 {
        self.shared.dropped_filtered.load(Ordering::Relaxed)
    }

    /// Whether the bridge's output has ended
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl RadioLink for BridgeRadio {
    fn init(&self, modulation: Modulation) -> Result<(), RadioError> {
        self.send_line(&format!("INIT {}", modulation))?;
        self.shared.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_address_filter(&self, addresses: &[u8]) -> Result<(), RadioError> {
        self.ensure_initialized()?;
        self.send_line(&format_filter_line(addresses))?;
        *self.shared.filter() = addresses.to_vec();
        Ok(())
    }

    fn receive_async(&self, on_complete: RxCallback) -> Result<(), RadioError> {
        self.ensure_initialized()?;
        self.shared.arm(on_complete)
    }

    fn transmit(&self, frame: &TxFrame) -> Result<(), RadioError> {
        self.ensure_initialized()?;
        self.send_line(&format_tx_line(frame))
    }
}

impl Drop for BridgeRadio {
    fn drop(&mut self) {
        let mut child = self.child.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = child.kill();
        let _ = child.wait();
    }
}

/// Reader loop (runs in dedicated thread)
fn run_reader(stdout: std::process::ChildStdout, shared: Arc<BridgeShared>) {
    let reader = BufReader::new(stdout);

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Error reading from radio bridge: {}", e);
                break;
            }
        };

        match parse_bridge_line(&line) {
            Some(BridgeLine::Frame(frame)) => {
                shared.frames_received.fetch_add(1, Ordering::Relaxed);
                let accepted = {
                    let filter = shared.filter();
                    filter.is_empty() || filter.contains(&frame.dst_address)
                };
                if accepted {
                    shared.complete(Ok(frame));
                } else {
                    shared.dropped_filtered.fetch_add(1, Ordering::Relaxed);
                    debug!("Bridge: frame for {:#04x} filtered", frame.dst_address);
                }
            }
            Some(BridgeLine::Failure(e)) => shared.complete(Err(e)),
            None => {
                if line.starts_with('*') {
                    warn!("Malformed bridge frame line: {}", line);
                } else if !line.trim().is_empty() {
                    info!("[bridge] {}", line.trim());
                }
            }
        }
    }

    warn!("Radio bridge stdout closed (EOF)");
    // Wake whoever is waiting on the outstanding receive
    if let Some(cb) = shared.close() {
        cb(Err(RxError::Aborted));
    }
}

/// Parse a bridge output line: `*<hex>;<rssi>` or `!<reason>`
fn parse_bridge_line(line: &str) -> Option<BridgeLine> {
    let line = line.trim();

    if let Some(reason) = line.strip_prefix('!') {
        let reason = reason.trim();
        let error = match reason.to_ascii_lowercase().as_str() {
            "timeout" => RxError::Timeout,
            "aborted" => RxError::Aborted,
            _ => RxError::Device(reason.to_string()),
        };
        return Some(BridgeLine::Failure(error));
    }

    let body = line.strip_prefix('*')?;
    let (hex_str, rssi_str) = body.split_once(';')?;
    let bytes = hex::decode(hex_str).ok()?;
    let (&dst_address, payload) = bytes.split_first()?;
    let rssi = rssi_str.trim().parse::<i8>().ok()?;

    Some(BridgeLine::Frame(RxFrame {
        dst_address,
        payload: payload.to_vec(),
        rssi,
    }))
}

fn format_tx_line(frame: &TxFrame) -> String {
    format!("TX {:02X} {}", frame.dst_address, hex::encode_upper(&frame.payload))
}

fn format_filter_line(addresses: &[u8]) -> String {
    let mut line = String::from("FILTER");
    for addr in addresses {
        line.push_str(&format!(" {:02X}", addr));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_line() {
        let parsed = parse_bridge_line("*000500012C;-60");
        assert_eq!(
            parsed,
            Some(BridgeLine::Frame(RxFrame {
                dst_address: 0x00,
                payload: vec![0x05, 0x00, 0x01, 0x2C],
                rssi: -60,
            }))
        );
    }

    #[test]
    fn test_parse_frame_line_with_crlf() {
        assert!(matches!(
            parse_bridge_line("*000500012C;-71\r\n"),
            Some(BridgeLine::Frame(RxFrame { rssi: -71, .. }))
        ));
    }

    #[test]
    fn test_parse_failure_line() {
        assert_eq!(
            parse_bridge_line("!timeout"),
            Some(BridgeLine::Failure(RxError::Timeout))
        );
        assert_eq!(
            parse_bridge_line("! crc mismatch"),
            Some(BridgeLine::Failure(RxError::Device("crc mismatch".to_string())))
        );
    }

    #[test]
    fn test_parse_invalid_lines() {
        assert!(parse_bridge_line("bridge ready").is_none());
        assert!(parse_bridge_line("*zz;-60").is_none());
        assert!(parse_bridge_line("*0005;").is_none());
        assert!(parse_bridge_line("*0005;-200").is_none()); // rssi out of range
        assert!(parse_bridge_line("*;-60").is_none());
    }

    #[test]
    fn test_arm_after_close_is_rejected() {
        let shared = BridgeShared::default();
        assert!(shared.close().is_none());

        let result = shared.arm(Box::new(|_: RxResult| {}));
        assert!(matches!(result, Err(RadioError::Closed)));
        assert!(shared.armed().is_none());
    }

    #[test]
    fn test_close_returns_outstanding_callback() {
        let shared = BridgeShared::default();
        let (tx, rx) = std::sync::mpsc::channel();
        shared
            .arm(Box::new(move |result| {
                let _ = tx.send(result);
            }))
            .unwrap();
        assert!(matches!(shared.arm(Box::new(|_: RxResult| {})), Err(RadioError::AlreadyArmed)));

        let outstanding = shared.close().unwrap();
        outstanding(Err(RxError::Aborted));
        assert_eq!(rx.recv().unwrap(), Err(RxError::Aborted));
        assert!(shared.armed().is_none());
    }

    /// Write `script` to a temp file and start it under `sh` as the bridge
    #[cfg(unix)]
    fn spawn_script(name: &str, script: &str) -> BridgeRadio {
        let path = std::env::temp_dir().join(format!(
            "sensor-coordinator-{}-{}.sh",
            name,
            std::process::id()
        ));
        std::fs::write(&path, script).unwrap();
        BridgeRadio::spawn(&format!("sh {}", path.display())).unwrap()
    }

    #[cfg(unix)]
    fn wait_closed(radio: &BridgeRadio) {
        for _ in 0..100 {
            if radio.is_closed() {
                return;
            }
            thread::sleep(std::time::Duration::from_millis(20));
        }
        panic!("bridge never reached EOF");
    }

    #[cfg(unix)]
    #[test]
    fn test_bridge_process_filters_and_drops_idle_frames() {
        // Waits for INIT, FILTER and one TX, then emits three frames and exits
        let radio = spawn_script(
            "frames",
            "read init\nread filter\nread tx\n\
             echo '*000500012C;-60'\n\
             echo '*070500012C;-60'\n\
             echo '*000600012C;-61'\n",
        );
        assert_eq!(radio.command().split_whitespace().next(), Some("sh"));

        radio.init(Modulation::Gfsk50Kbps).unwrap();
        radio.set_address_filter(&[0x00]).unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        radio
            .receive_async(Box::new(move |result| {
                let _ = tx.send(result);
            }))
            .unwrap();
        radio
            .transmit(&TxFrame {
                dst_address: 0x05,
                payload: vec![0x00, 0x02],
            })
            .unwrap();

        let first = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(
            first,
            Ok(RxFrame {
                dst_address: 0x00,
                payload: vec![0x05, 0x00, 0x01, 0x2C],
                rssi: -60,
            })
        );

        wait_closed(&radio);
        assert_eq!(radio.frames_received(), 3);
        assert_eq!(radio.dropped_filtered(), 1);
        assert_eq!(radio.dropped_idle(), 1);
        assert!(matches!(
            radio.receive_async(Box::new(|_: RxResult| {})),
            Err(RadioError::Closed)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_bridge_eof_aborts_outstanding_receive() {
        let radio = spawn_script("eof", "read init\nread tx\n");

        radio.init(Modulation::Gfsk50Kbps).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        radio
            .receive_async(Box::new(move |result| {
                let _ = tx.send(result);
            }))
            .unwrap();
        radio
            .transmit(&TxFrame {
                dst_address: 0x05,
                payload: vec![0x00, 0x02],
            })
            .unwrap();

        let result = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(result, Err(RxError::Aborted));

        wait_closed(&radio);
        assert!(matches!(
            radio.receive_async(Box::new(|_: RxResult| {})),
            Err(RadioError::Closed)
        ));
    }

    #[test]
    fn test_format_commands() {
        let tx = TxFrame {
            dst_address: 0x05,
            payload: vec![0x00, 0x02],
        };
        assert_eq!(format_tx_line(&tx), "TX 05 0002");
        assert_eq!(format_filter_line(&[0x00]), "FILTER 00");
        assert_eq!(format_filter_line(&[0x00, 0x1A]), "FILTER 00 1A");
    }
}
