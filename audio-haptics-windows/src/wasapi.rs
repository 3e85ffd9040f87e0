//! Event-driven WASAPI shared-mode capture, shared by the loopback and
//! microphone backends.
//!
//! Every COM object lives on one worker thread per stream. The worker opens
//! the endpoint, then waits for commands; while running it blocks on the
//! client's buffer event and forwards each packet to the capture thread
//! through a bounded channel.
//!
//! ```text
//! control thread ──open/start/stop/close──▶ [wasapi worker] ──packets──▶ capture thread
//! ```

use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE, RPC_E_CHANGED_MODE, WAIT_OBJECT_0};
use windows::Win32::Media::Audio::*;
use windows::Win32::Media::KernelStreaming::KSDATAFORMAT_SUBTYPE_IEEE_FLOAT;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::{
    AvRevertMmThreadCharacteristics, AvSetMmThreadCharacteristicsW, CreateEventW, WaitForSingleObject,
};

use audio_haptics_core::models::audio_models::StreamFormat;
use audio_haptics_core::models::error::CaptureError;
use audio_haptics_core::traits::capture_backend::RawBlock;

use crate::convert::{sample_format_for, FORMAT_TAG_EXTENSIBLE};
use crate::error::PlatformError;
use crate::packet_queue::{packet_queue, Packet, PacketResult, PacketSender};

/// Which endpoint a stream captures from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// The default render device, captured in loopback mode.
    Loopback,
    /// A capture device; `None` selects the default microphone.
    Microphone { device_id: Option<String> },
}

impl Endpoint {
    fn thread_name(&self) -> &'static str {
        match self {
            Self::Loopback => "wasapi-loopback",
            Self::Microphone { .. } => "wasapi-mic",
        }
    }
}

enum Command {
    Start,
    Stop,
    Close,
}

enum Reply {
    Opened(StreamFormat),
    Started,
    Failed(CaptureError),
}

/// Requested shared-mode buffer: 100 ms in 100 ns units.
const BUFFER_DURATION: i64 = 1_000_000;
/// Worker wakes at least this often to check for commands.
const EVENT_WAIT_MS: u32 = 100;
/// How long `open`/`start` wait for the worker to answer.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);
/// Packets queued for the capture thread before new ones are dropped.
const PACKET_QUEUE: usize = 64;

/// Handle to a WASAPI worker thread.
pub struct WasapiStream {
    endpoint: Endpoint,
    commands: Option<Sender<Command>>,
    replies: Option<Receiver<Reply>>,
    packets: Option<Receiver<PacketResult>>,
    recycle: Option<Sender<Vec<u8>>>,
    worker: Option<thread::JoinHandle<()>>,
    current: Vec<u8>,
    started: bool,
}

impl WasapiStream {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            commands: None,
            replies: None,
            packets: None,
            recycle: None,
            worker: None,
            current: Vec::new(),
            started: false,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Spawn the worker and wait for it to open the endpoint.
    pub fn open(&mut self) -> Result<StreamFormat, CaptureError> {
        if self.worker.is_some() {
            return Err(CaptureError::InvalidState("stream already open".into()));
        }

        let (command_tx, command_rx) = bounded(4);
        let (reply_tx, reply_rx) = bounded(1);
        let (packet_tx, packet_rx) = packet_queue(PACKET_QUEUE);
        let (recycle_tx, recycle_rx) = bounded(PACKET_QUEUE);

        let endpoint = self.endpoint.clone();
        let worker = Worker {
            endpoint: endpoint.clone(),
            commands: command_rx,
            replies: reply_tx,
            packets: packet_tx,
            recycle: recycle_rx,
        };
        let handle = thread::Builder::new()
            .name(endpoint.thread_name().into())
            .spawn(move || worker.run())
            .map_err(|e| CaptureError::ThreadSpawnFailed(e.to_string()))?;

        self.commands = Some(command_tx);
        self.replies = Some(reply_rx);
        self.packets = Some(packet_rx);
        self.recycle = Some(recycle_tx);
        self.worker = Some(handle);

        match self.await_reply() {
            Ok(Reply::Opened(format)) => Ok(format),
            Ok(_) => {
                self.close();
                Err(CaptureError::InvalidState("unexpected worker reply".into()))
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    pub fn start(&mut self) -> Result<(), CaptureError> {
        // Drop anything left over from a previous run.
        if let Some(packets) = &self.packets {
            while packets.try_recv().is_ok() {}
        }
        self.send(Command::Start)?;
        match self.await_reply()? {
            Reply::Started => {
                self.started = true;
                Ok(())
            }
            _ => Err(CaptureError::InvalidState("unexpected worker reply".into())),
        }
    }

    /// Block until the worker forwards a packet or `timeout` passes.
    pub fn poll(&mut self, timeout: Duration) -> Result<Option<RawBlock<'_>>, CaptureError> {
        if !self.started {
            return Err(CaptureError::InvalidState("stream not started".into()));
        }
        let packets = self
            .packets
            .as_ref()
            .ok_or_else(|| CaptureError::InvalidState("stream not open".into()))?;

        match packets.recv_timeout(timeout) {
            Ok(Ok(packet)) => {
                let previous = std::mem::replace(&mut self.current, packet.data);
                if let Some(recycle) = &self.recycle {
                    let _ = recycle.try_send(previous);
                }
                Ok(Some(RawBlock {
                    data: &self.current,
                    frames: packet.frames,
                    silent: packet.silent,
                }))
            }
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(PlatformError::WorkerGone.into()),
        }
    }

    pub fn stop(&mut self) {
        if self.started {
            let _ = self.send(Command::Stop);
            self.started = false;
        }
    }

    /// Tell the worker to exit and join it.
    ///
    /// Our receivers are dropped first so a worker blocked handing us a
    /// reply wakes up; dropping the command sender ends it even if the
    /// `Close` could not be queued.
    pub fn close(&mut self) {
        self.replies = None;
        self.packets = None;
        self.recycle = None;
        if let Some(commands) = self.commands.take() {
            let _ = commands.try_send(Command::Close);
        }
        self.started = false;
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::error!("WASAPI worker panicked");
            }
        }
        self.current = Vec::new();
    }

    fn send(&self, command: Command) -> Result<(), CaptureError> {
        self.commands
            .as_ref()
            .ok_or_else(|| CaptureError::InvalidState("stream not open".into()))?
            .send(command)
            .map_err(|_| PlatformError::WorkerGone.into())
    }

    fn await_reply(&self) -> Result<Reply, CaptureError> {
        let replies = self
            .replies
            .as_ref()
            .ok_or_else(|| CaptureError::InvalidState("stream not open".into()))?;
        match replies.recv_timeout(REPLY_TIMEOUT) {
            Ok(Reply::Failed(e)) => Err(e),
            Ok(reply) => Ok(reply),
            Err(_) => Err(PlatformError::WorkerGone.into()),
        }
    }
}

impl Drop for WasapiStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// COM objects for one opened endpoint. Only ever touched by the worker.
struct Client {
    audio_client: IAudioClient,
    capture_client: IAudioCaptureClient,
    event: HANDLE,
    block_align: usize,
}

impl Drop for Client {
    fn drop(&mut self) {
        unsafe {
            let _ = self.audio_client.Stop();
            let _ = CloseHandle(self.event);
        }
    }
}

struct Worker {
    endpoint: Endpoint,
    commands: Receiver<Command>,
    replies: Sender<Reply>,
    packets: PacketSender,
    recycle: Receiver<Vec<u8>>,
}

impl Worker {
    fn run(self) {
        let _com = match ComApartment::enter() {
            Ok(guard) => guard,
            Err(e) => {
                let _ = self.replies.send(Reply::Failed(e.into_setup_error()));
                return;
            }
        };

        let (client, format) = match unsafe { open_client(&self.endpoint) } {
            Ok(opened) => opened,
            Err(e) => {
                let _ = self.replies.send(Reply::Failed(e));
                return;
            }
        };
        log::debug!("WASAPI {:?} opened: {}", self.endpoint, format);
        if self.replies.send(Reply::Opened(format)).is_err() {
            return;
        }

        loop {
            match self.commands.recv() {
                Ok(Command::Start) => {
                    if let Err(e) = unsafe { client.audio_client.Start() } {
                        let err = PlatformError::win("IAudioClient::Start", &e);
                        let _ = self.replies.send(Reply::Failed(err.into()));
                        continue;
                    }
                    let _ = self.replies.send(Reply::Started);

                    match self.stream(&client) {
                        Ok(true) => continue,
                        Ok(false) => break,
                        Err(e) => {
                            log::error!("WASAPI {:?} stream error: {}", self.endpoint, e);
                            let _ = self.packets.offer(Err(e.into()));
                            break;
                        }
                    }
                }
                Ok(Command::Stop) => {}
                Ok(Command::Close) | Err(_) => break,
            }
        }
        drop(client);
        log::debug!("WASAPI {:?} worker exiting", self.endpoint);
    }

    /// Forward packets until told to stop. Returns false on `Close`.
    fn stream(&self, client: &Client) -> Result<bool, PlatformError> {
        let _mmcss = MmcssRegistration::pro_audio();

        loop {
            match self.commands.try_recv() {
                Ok(Command::Stop) => {
                    unsafe { client.audio_client.Stop() }.map_err(|e| PlatformError::win("IAudioClient::Stop", &e))?;
                    return Ok(true);
                }
                Ok(Command::Close) | Err(TryRecvError::Disconnected) => return Ok(false),
                Ok(Command::Start) | Err(TryRecvError::Empty) => {}
            }

            if unsafe { WaitForSingleObject(client.event, EVENT_WAIT_MS) } != WAIT_OBJECT_0 {
                continue;
            }
            self.drain(client)?;
        }
    }

    /// Copy out every pending packet.
    fn drain(&self, client: &Client) -> Result<(), PlatformError> {
        loop {
            let pending = unsafe { client.capture_client.GetNextPacketSize() }
                .map_err(|e| PlatformError::win("GetNextPacketSize", &e))?;
            if pending == 0 {
                return Ok(());
            }

            let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
            let mut num_frames: u32 = 0;
            let mut flags: u32 = 0;
            unsafe {
                client
                    .capture_client
                    .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, None, None)
                    .map_err(|e| PlatformError::win("GetBuffer", &e))?;
            }

            let silent = flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0;
            let mut data = self.recycle.try_recv().unwrap_or_default();
            data.clear();
            if !silent && num_frames > 0 && !buffer_ptr.is_null() {
                let len = num_frames as usize * client.block_align;
                // SAFETY: GetBuffer returned `num_frames` frames of `block_align`
                // bytes, valid until ReleaseBuffer below.
                let bytes = unsafe { std::slice::from_raw_parts(buffer_ptr, len) };
                data.extend_from_slice(bytes);
            }

            unsafe { client.capture_client.ReleaseBuffer(num_frames) }
                .map_err(|e| PlatformError::win("ReleaseBuffer", &e))?;

            if num_frames == 0 {
                continue;
            }
            let packet = Packet {
                data,
                frames: num_frames as usize,
                silent,
            };
            self.packets.offer(Ok(packet))?;
        }
    }
}

/// Open the endpoint and set up event-driven shared-mode capture.
///
/// # Safety
/// Must run on a thread that has entered the COM MTA.
unsafe fn open_client(endpoint: &Endpoint) -> Result<(Client, StreamFormat), CaptureError> {
    let setup = |call: &'static str| move |e: windows::core::Error| PlatformError::win(call, &e).into_setup_error();

    let enumerator: IMMDeviceEnumerator =
        CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL).map_err(setup("CoCreateInstance"))?;

    let device = match endpoint {
        Endpoint::Loopback => enumerator
            .GetDefaultAudioEndpoint(eRender, eConsole)
            .map_err(|_| PlatformError::NoEndpoint("render").into_setup_error())?,
        Endpoint::Microphone { device_id: Some(id) } => {
            let wide_id: Vec<u16> = id.encode_utf16().chain(std::iter::once(0)).collect();
            enumerator
                .GetDevice(PCWSTR(wide_id.as_ptr()))
                .map_err(|_| CaptureError::DeviceNotAvailable)?
        }
        Endpoint::Microphone { device_id: None } => enumerator
            .GetDefaultAudioEndpoint(eCapture, eConsole)
            .map_err(|_| PlatformError::NoEndpoint("capture").into_setup_error())?,
    };

    let audio_client: IAudioClient = device.Activate(CLSCTX_ALL, None).map_err(setup("Activate"))?;

    let mix_format_ptr = audio_client.GetMixFormat().map_err(setup("GetMixFormat"))?;
    let described = describe_format(mix_format_ptr);

    let mut flags = AUDCLNT_STREAMFLAGS_EVENTCALLBACK | AUDCLNT_STREAMFLAGS_NOPERSIST;
    if *endpoint == Endpoint::Loopback {
        flags |= AUDCLNT_STREAMFLAGS_LOOPBACK;
    }
    let initialized = described.and_then(|(format, block_align)| {
        audio_client
            .Initialize(AUDCLNT_SHAREMODE_SHARED, flags, BUFFER_DURATION, 0, mix_format_ptr, None)
            .map_err(setup("IAudioClient::Initialize"))?;
        Ok((format, block_align))
    });
    CoTaskMemFree(Some(mix_format_ptr as *const _));
    let (format, block_align) = initialized?;

    let event = CreateEventW(None, false, false, PCWSTR::null()).map_err(setup("CreateEventW"))?;
    if let Err(e) = audio_client.SetEventHandle(event) {
        let _ = CloseHandle(event);
        return Err(setup("SetEventHandle")(e));
    }

    let capture_client: IAudioCaptureClient = match audio_client.GetService() {
        Ok(client) => client,
        Err(e) => {
            let _ = CloseHandle(event);
            return Err(setup("GetService")(e));
        }
    };

    let client = Client {
        audio_client,
        capture_client,
        event,
        block_align,
    };
    Ok((client, format))
}

/// Core format and bytes per frame for a mix format.
///
/// # Safety
/// `format` must point to a valid `WAVEFORMATEX`, extended to
/// `WAVEFORMATEXTENSIBLE` when its tag says so.
unsafe fn describe_format(format: *const WAVEFORMATEX) -> Result<(StreamFormat, usize), CaptureError> {
    let header = std::ptr::read_unaligned(format);
    let float_subformat = if header.wFormatTag == FORMAT_TAG_EXTENSIBLE {
        let ext = format as *const WAVEFORMATEXTENSIBLE;
        let sub = std::ptr::read_unaligned(std::ptr::addr_of!((*ext).SubFormat));
        sub == KSDATAFORMAT_SUBTYPE_IEEE_FLOAT
    } else {
        false
    };

    let sample_format =
        sample_format_for(header.wFormatTag, header.wBitsPerSample, float_subformat).map_err(CaptureError::from)?;
    let stream = StreamFormat::new(header.nSamplesPerSec, header.nChannels, sample_format);
    stream.validate().map_err(CaptureError::ConfigurationFailed)?;
    Ok((stream, header.nBlockAlign as usize))
}

/// Keeps the current thread in COM for as long as it lives.
///
/// Asks for the multithreaded apartment. A thread the host already put in
/// a single-threaded apartment is left as it is, and is not uninitialized
/// on drop.
pub(crate) struct ComApartment {
    owned: bool,
}

impl ComApartment {
    pub(crate) fn enter() -> Result<Self, PlatformError> {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        if hr == RPC_E_CHANGED_MODE {
            log::debug!("Thread already in a single-threaded COM apartment");
            return Ok(Self { owned: false });
        }
        hr.ok().map_err(|e| PlatformError::win("CoInitializeEx", &e))?;
        Ok(Self { owned: true })
    }

    pub(crate) fn is_owned(&self) -> bool {
        self.owned
    }
}

impl Drop for ComApartment {
    fn drop(&mut self) {
        if self.owned {
            unsafe {
                CoUninitialize();
            }
        }
    }
}

/// Registers the current thread with MMCSS until dropped.
struct MmcssRegistration(Option<HANDLE>);

impl MmcssRegistration {
    fn pro_audio() -> Self {
        let mut task_index = 0u32;
        let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
        match unsafe { AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index) } {
            Ok(handle) => Self(Some(handle)),
            Err(e) => {
                log::debug!("MMCSS registration failed: {}", e);
                Self(None)
            }
        }
    }
}

impl MmcssRegistration {
    /// Drop the thread's MMCSS class. Later calls do nothing.
    fn revert(&mut self) {
        if let Some(handle) = self.0.take() {
            if let Err(e) = unsafe { AvRevertMmThreadCharacteristics(handle) } {
                log::debug!("MMCSS revert failed: {}", e);
            }
        }
    }
}

impl Drop for MmcssRegistration {
    fn drop(&mut self) {
        self.revert();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn apartment_tolerates_single_threaded_host() {
        thread::spawn(|| {
            unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) }.ok().unwrap();

            let apartment = ComApartment::enter().unwrap();
            assert!(!apartment.is_owned());
            drop(apartment);

            // The host's own initialization is still in place to balance.
            unsafe { CoUninitialize() };
        })
        .join()
        .unwrap();
    }

    #[test]
    fn apartment_enters_mta_on_fresh_thread() {
        thread::spawn(|| {
            let apartment = ComApartment::enter().unwrap();
            assert!(apartment.is_owned());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn mmcss_registration_reverts_once() {
        thread::spawn(|| {
            let mut registration = MmcssRegistration::pro_audio();
            registration.revert();
            assert!(registration.0.is_none());
            registration.revert();
        })
        .join()
        .unwrap();
    }

    #[test]
    fn close_is_idempotent_without_open() {
        let mut stream = WasapiStream::new(Endpoint::Loopback);
        stream.close();
        stream.close();
        assert!(stream.poll(std::time::Duration::ZERO).is_err());
    }
}
