//! ESP-IDF platform helpers for `SppLink`.
//!
//! This module is compiled only for `target_os = "espidf"` and contains the
//! Bluedroid GAP and SPP glue.  Bluedroid callbacks are C function pointers
//! that cannot capture Rust state, so they write into [`SHARED`]; the
//! adapter polls it from the scheduler thread.  Callbacks run in the
//! Bluedroid task (not ISR), so a std `Mutex` is safe here.
//!
//! All public items are `pub(super)` to keep them private to the adapters
//! module.

use std::sync::{Mutex, MutexGuard, OnceLock};

use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::sys::*;
use log::{debug, info, warn};

use crate::error::LinkError;
use crate::link::BdAddr;
use crate::link::pairing::{AutoPairing, LinkMode, PairingHandler};

/// Bytes buffered between data-indication events and `read_byte`.
const RX_CAPACITY: usize = 512;

/// Upper bound on one SDP discovery + RFCOMM open.
const OPEN_TIMEOUT_MS: u32 = 10_000;

/// Inquiry length in 1.28 s units.
const INQUIRY_UNITS: u8 = 8;

/// Polling step while waiting for a Bluedroid event.
const POLL_STEP_MS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum OpenPhase {
    Idle,
    Discovering,
    Opening,
    Open,
    Failed,
}

pub(super) struct Shared {
    pub phase: OpenPhase,
    pub handle: Option<u32>,
    pub peer: Option<[u8; 6]>,
    pub rx: heapless::Deque<u8, RX_CAPACITY>,
    /// Name being searched for during inquiry.
    pub wanted_name: heapless::String<32>,
    pub found: Option<[u8; 6]>,
    pub inquiry_running: bool,
}

impl Shared {
    const fn new() -> Self {
        Self {
            phase: OpenPhase::Idle,
            handle: None,
            peer: None,
            rx: heapless::Deque::new(),
            wanted_name: heapless::String::new(),
            found: None,
            inquiry_running: false,
        }
    }
}

static SHARED: Mutex<Shared> = Mutex::new(Shared::new());
static PAIRING: OnceLock<AutoPairing> = OnceLock::new();

/// Lock the shared state, recovering from a poisoned lock.
pub(super) fn shared() -> MutexGuard<'static, Shared> {
    SHARED.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn esp_ok(ret: esp_err_t, what: &'static str) -> Result<(), &'static str> {
    if ret == ESP_OK { Ok(()) } else {
        warn!("BT: {what} failed ({ret})");
        Err(what)
    }
}

// ── Init ──────────────────────────────────────────────────────

/// Register callbacks, start SPP in callback mode, and set the pairing
/// policy.  The controller and Bluedroid are already up (via `BtDriver`).
pub(super) fn init(device_name: &str, pairing: AutoPairing) -> Result<(), &'static str> {
    if PAIRING.set(pairing).is_err() {
        warn!("BT: pairing handler already installed, keeping the first one");
    }

    let mut name = [0u8; 33];
    let len = device_name.len().min(32);
    name[..len].copy_from_slice(&device_name.as_bytes()[..len]);

    // SAFETY: every pointer passed below outlives its call, and the
    // callbacks are `extern "C"` functions with 'static lifetime.
    unsafe {
        esp_ok(esp_bt_dev_set_device_name(name.as_ptr() as *const _), "set_device_name")?;
        esp_ok(esp_bt_gap_register_callback(Some(gap_event_handler)), "gap_register")?;
        esp_ok(esp_spp_register_callback(Some(spp_event_handler)), "spp_register")?;

        let spp_cfg = esp_spp_cfg_t {
            mode: esp_spp_mode_t_ESP_SPP_MODE_CB,
            enable_l2cap_ertm: true,
            tx_buffer_size: 0,
        };
        esp_ok(esp_spp_enhanced_init(&spp_cfg), "spp_init")?;

        // Secure Simple Pairing with no I/O: Just Works.
        let iocap: esp_bt_io_cap_t = ESP_BT_IO_CAP_NONE as esp_bt_io_cap_t;
        esp_ok(
            esp_bt_gap_set_security_param(
                esp_bt_sp_param_t_ESP_BT_SP_IOCAP_MODE,
                &iocap as *const _ as *mut _,
                core::mem::size_of::<esp_bt_io_cap_t>() as u8,
            ),
            "set_iocap",
        )?;

        // Legacy pairing: variable PIN so every request reaches the handler.
        let mut pin: esp_bt_pin_code_t = [0; 16];
        esp_ok(
            esp_bt_gap_set_pin(esp_bt_pin_type_t_ESP_BT_PIN_TYPE_VARIABLE, 0, pin.as_mut_ptr()),
            "set_pin",
        )?;

        esp_ok(
            esp_bt_gap_set_scan_mode(
                esp_bt_connection_mode_t_ESP_BT_CONNECTABLE,
                esp_bt_discovery_mode_t_ESP_BT_NON_DISCOVERABLE,
            ),
            "set_scan_mode",
        )?;
    }

    info!("BT: Bluedroid SPP initialised as '{device_name}'");
    Ok(())
}

// ── Operations ────────────────────────────────────────────────

/// Run SDP on `addr`, then open RFCOMM on the first SPP channel found.
/// Blocks until the channel opens, fails, or times out.
pub(super) fn open(addr: &BdAddr) -> Result<(), LinkError> {
    let mut bda = addr.0;
    {
        let mut s = shared();
        s.phase = OpenPhase::Discovering;
        s.peer = Some(bda);
    }

    // SAFETY: `bda` is a valid 6-byte address for the duration of the call.
    let ret = unsafe { esp_spp_start_discovery(bda.as_mut_ptr()) };
    if ret != ESP_OK {
        shared().phase = OpenPhase::Failed;
        return Err(LinkError::ConnectFailed);
    }

    let mut waited = 0;
    while waited < OPEN_TIMEOUT_MS {
        match shared().phase {
            OpenPhase::Open => return Ok(()),
            OpenPhase::Failed | OpenPhase::Idle => return Err(LinkError::ConnectFailed),
            OpenPhase::Discovering | OpenPhase::Opening => {}
        }
        FreeRtos::delay_ms(POLL_STEP_MS);
        waited += POLL_STEP_MS;
    }

    warn!("BT: open timed out after {OPEN_TIMEOUT_MS} ms");
    shared().phase = OpenPhase::Failed;
    Err(LinkError::ConnectFailed)
}

/// Inquiry for a device advertising `name`.  Returns its address.
pub(super) fn find_by_name(name: &str) -> Option<BdAddr> {
    {
        let mut s = shared();
        s.wanted_name = crate::config::fixed(name);
        s.found = None;
        s.inquiry_running = true;
    }

    // SAFETY: plain FFI call with value arguments.
    let ret = unsafe {
        esp_bt_gap_start_discovery(
            esp_bt_inq_mode_t_ESP_BT_INQ_MODE_GENERAL_INQUIRY,
            INQUIRY_UNITS,
            0,
        )
    };
    if ret != ESP_OK {
        warn!("BT: inquiry failed to start ({ret})");
        shared().inquiry_running = false;
        return None;
    }

    // Inquiry stops by itself after INQUIRY_UNITS × 1.28 s, or when
    // the callback cancels it on a match.
    let limit_ms = u32::from(INQUIRY_UNITS) * 1_280 + 1_000;
    let mut waited = 0;
    while waited < limit_ms {
        let s = shared();
        if !s.inquiry_running {
            return s.found.map(BdAddr);
        }
        drop(s);
        FreeRtos::delay_ms(POLL_STEP_MS * 10);
        waited += POLL_STEP_MS * 10;
    }
    unsafe {
        esp_bt_gap_cancel_discovery();
    }
    shared().found.map(BdAddr)
}

pub(super) fn write(data: &[u8]) -> usize {
    let Some(handle) = shared().handle else {
        return 0;
    };
    let Ok(len) = i32::try_from(data.len()) else {
        return 0;
    };
    // SAFETY: Bluedroid copies `data` before returning.
    let ret = unsafe { esp_spp_write(handle, len, data.as_ptr() as *mut u8) };
    if ret == ESP_OK { data.len() } else { 0 }
}

pub(super) fn close() {
    let handle = {
        let mut s = shared();
        s.phase = OpenPhase::Idle;
        s.rx.clear();
        s.handle.take()
    };
    if let Some(h) = handle {
        // SAFETY: `h` came from an OPEN event and has not been closed.
        unsafe {
            esp_spp_disconnect(h);
        }
    }
}

pub(super) fn remove_bond(addr: &BdAddr) -> Result<(), LinkError> {
    let mut bda = addr.0;
    // SAFETY: `bda` is a valid 6-byte address for the duration of the call.
    let ret = unsafe { esp_bt_gap_remove_bond_device(bda.as_mut_ptr()) };
    if ret == ESP_OK {
        info!("BT: bond removed for {addr}");
        Ok(())
    } else {
        Err(LinkError::BondRemoval(ret))
    }
}

// ── Callbacks ─────────────────────────────────────────────────

unsafe extern "C" fn spp_event_handler(event: esp_spp_cb_event_t, param: *mut esp_spp_cb_param_t) {
    match event {
        esp_spp_cb_event_t_ESP_SPP_INIT_EVT => {
            debug!("SPP: initialised");
        }
        esp_spp_cb_event_t_ESP_SPP_DISCOVERY_COMP_EVT => {
            let p = unsafe { &(*param).disc_comp };
            let mut s = shared();
            if p.status == esp_spp_status_t_ESP_SPP_SUCCESS && p.scn_num > 0 {
                let Some(mut peer) = s.peer else {
                    s.phase = OpenPhase::Failed;
                    return;
                };
                s.phase = OpenPhase::Opening;
                drop(s);
                debug!("SPP: SDP found {} channel(s), opening scn {}", p.scn_num, p.scn[0]);
                let ret = unsafe {
                    esp_spp_connect(
                        ESP_SPP_SEC_AUTHENTICATE as esp_spp_sec_t,
                        esp_spp_role_t_ESP_SPP_ROLE_MASTER,
                        p.scn[0],
                        peer.as_mut_ptr(),
                    )
                };
                if ret != ESP_OK {
                    shared().phase = OpenPhase::Failed;
                }
            } else {
                warn!("SPP: SDP discovery failed (status {})", p.status);
                s.phase = OpenPhase::Failed;
            }
        }
        esp_spp_cb_event_t_ESP_SPP_OPEN_EVT => {
            let p = unsafe { &(*param).open };
            let mut s = shared();
            if p.status == esp_spp_status_t_ESP_SPP_SUCCESS {
                s.handle = Some(p.handle);
                s.peer = Some(p.rem_bda);
                s.phase = OpenPhase::Open;
                info!("SPP: channel open (handle {})", p.handle);
            } else {
                s.phase = OpenPhase::Failed;
                warn!("SPP: open failed (status {})", p.status);
            }
        }
        esp_spp_cb_event_t_ESP_SPP_CL_INIT_EVT => {
            let p = unsafe { &(*param).cl_init };
            if p.status != esp_spp_status_t_ESP_SPP_SUCCESS {
                shared().phase = OpenPhase::Failed;
            }
        }
        esp_spp_cb_event_t_ESP_SPP_DATA_IND_EVT => {
            let p = unsafe { &(*param).data_ind };
            let data = unsafe { core::slice::from_raw_parts(p.data, usize::from(p.len)) };
            super::buffer_rx(&mut shared().rx, data);
        }
        esp_spp_cb_event_t_ESP_SPP_CLOSE_EVT => {
            let mut s = shared();
            s.handle = None;
            if s.phase != OpenPhase::Failed {
                s.phase = OpenPhase::Idle;
            }
            info!("SPP: channel closed");
        }
        _ => {}
    }
}

unsafe extern "C" fn gap_event_handler(
    event: esp_bt_gap_cb_event_t,
    param: *mut esp_bt_gap_cb_param_t,
) {
    let Some(handler) = PAIRING.get() else {
        return;
    };

    match event {
        esp_bt_gap_cb_event_t_ESP_BT_GAP_AUTH_CMPL_EVT => {
            let p = unsafe { &(*param).auth_cmpl };
            let name = cstr_bytes(&p.device_name);
            handler.on_auth_complete(p.stat == esp_bt_status_t_ESP_BT_STATUS_SUCCESS, name);
        }
        esp_bt_gap_cb_event_t_ESP_BT_GAP_PIN_REQ_EVT => {
            let p = unsafe { &mut (*param).pin_req };
            let peer = BdAddr(p.bda);
            let mut code: esp_bt_pin_code_t = [0; 16];
            let accept = match handler.on_pin_request(&peer) {
                Some(pin) => {
                    code[..4].copy_from_slice(&pin);
                    true
                }
                None => false,
            };
            unsafe {
                esp_bt_gap_pin_reply(p.bda.as_mut_ptr(), accept, 4, code.as_mut_ptr());
            }
        }
        esp_bt_gap_cb_event_t_ESP_BT_GAP_CFM_REQ_EVT => {
            let p = unsafe { &mut (*param).cfm_req };
            let accept = handler.on_confirm_request(&BdAddr(p.bda), p.num_val);
            unsafe {
                esp_bt_gap_ssp_confirm_reply(p.bda.as_mut_ptr(), accept);
            }
        }
        esp_bt_gap_cb_event_t_ESP_BT_GAP_MODE_CHG_EVT => {
            let p = unsafe { &(*param).mode_chg };
            handler.on_mode_change(&BdAddr(p.bda), LinkMode::from_raw(p.mode as u8));
        }
        esp_bt_gap_cb_event_t_ESP_BT_GAP_DISC_RES_EVT => {
            let p = unsafe { &(*param).disc_res };
            let props = unsafe { core::slice::from_raw_parts(p.prop, p.num_prop as usize) };
            let matched = props.iter().any(|prop| {
                let name = unsafe { prop_name(prop) };
                name.is_some_and(|n| n == shared().wanted_name.as_str())
            });
            if matched {
                info!("BT: found '{}' at {}", shared().wanted_name, BdAddr(p.bda));
                shared().found = Some(p.bda);
                unsafe {
                    esp_bt_gap_cancel_discovery();
                }
            }
        }
        esp_bt_gap_cb_event_t_ESP_BT_GAP_DISC_STATE_CHANGED_EVT => {
            let p = unsafe { &(*param).disc_st_chg };
            if p.state == esp_bt_gap_discovery_state_t_ESP_BT_GAP_DISCOVERY_STOPPED {
                shared().inquiry_running = false;
            }
        }
        _ => {}
    }
}

/// Device name carried by one inquiry property, if it has one.
unsafe fn prop_name(prop: &esp_bt_gap_dev_prop_t) -> Option<&str> {
    let raw = unsafe { core::slice::from_raw_parts(prop.val as *const u8, prop.len as usize) };
    match prop.type_ {
        esp_bt_gap_dev_prop_type_t_ESP_BT_GAP_DEV_PROP_BDNAME => core::str::from_utf8(raw).ok(),
        esp_bt_gap_dev_prop_type_t_ESP_BT_GAP_DEV_PROP_EIR => {
            let mut len: u8 = 0;
            let ptr = unsafe {
                esp_bt_gap_resolve_eir_data(
                    prop.val as *mut u8,
                    ESP_BT_EIR_TYPE_CMPL_LOCAL_NAME as esp_bt_eir_type_t,
                    &mut len,
                )
            };
            if ptr.is_null() {
                return None;
            }
            let name = unsafe { core::slice::from_raw_parts(ptr, usize::from(len)) };
            core::str::from_utf8(name).ok()
        }
        _ => None,
    }
}

fn cstr_bytes(buf: &[u8]) -> &str {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    core::str::from_utf8(&buf[..end]).unwrap_or("?")
}
