//! CPAL-based audio sink
//!
//! Cross-platform device output using the `cpal` crate. Rendered frames are
//! queued and drained by the device callback; the queue depth is reported
//! as the sink delay.

#[cfg(feature = "audio-cpal")]
mod implementation {
    use crate::audio::format::CHANNELS;
    use crate::audio::sink::{AudioSink, SinkError};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex, PoisonError, mpsc};
    use std::thread;
    use std::time::Duration;

    /// Queue depth above which `play` waits for the device to drain
    const MAX_QUEUED_SECONDS: f64 = 0.5;

    enum StreamCommand {
        Stop,
    }

    /// CPAL-based audio sink
    pub struct CpalSink {
        device_name: Option<String>,
        queue: Arc<Mutex<VecDeque<i16>>>,
        command_tx: Option<mpsc::Sender<StreamCommand>>,
        max_queued: usize,
    }

    impl CpalSink {
        /// Create a sink on the default output device
        #[must_use]
        pub fn new() -> Self {
            Self {
                device_name: None,
                queue: Arc::new(Mutex::new(VecDeque::new())),
                command_tx: None,
                max_queued: 0,
            }
        }

        /// Create a sink on a named output device
        #[must_use]
        pub fn with_device(name: impl Into<String>) -> Self {
            Self {
                device_name: Some(name.into()),
                ..Self::new()
            }
        }

        fn queued_samples(&self) -> usize {
            self.queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }

        fn open_device(&self) -> Result<cpal::Device, SinkError> {
            let host = cpal::default_host();
            match self.device_name {
                Some(ref id) => host
                    .output_devices()
                    .map_err(|e| SinkError::StreamError(e.to_string()))?
                    .find(|d| d.name().ok().as_deref() == Some(id.as_str()))
                    .ok_or_else(|| SinkError::DeviceNotFound(id.clone())),
                None => host
                    .default_output_device()
                    .ok_or_else(|| SinkError::DeviceNotFound("no default device".into())),
            }
        }

        fn spawn_stream_thread(
            device: cpal::Device,
            config: cpal::StreamConfig,
            queue: Arc<Mutex<VecDeque<i16>>>,
            rx: mpsc::Receiver<StreamCommand>,
            status_tx: mpsc::Sender<Result<(), SinkError>>,
        ) {
            // cpal streams are not Send; the stream lives on its own thread
            thread::spawn(move || {
                let err_fn = |err| tracing::error!("CPAL stream error: {}", err);

                let stream = device.build_output_stream(
                    &config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        let mut queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
                        for sample in data.iter_mut() {
                            *sample = queue.pop_front().unwrap_or(0);
                        }
                    },
                    err_fn,
                    None,
                );

                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            let _ = status_tx.send(Err(SinkError::StreamError(e.to_string())));
                            return;
                        }
                        if status_tx.send(Ok(())).is_err() {
                            return;
                        }
                        // Keep the stream alive until told otherwise
                        let _ = rx.recv();
                    }
                    Err(e) => {
                        let _ = status_tx.send(Err(SinkError::StreamError(e.to_string())));
                    }
                }
            });
        }
    }

    impl Default for CpalSink {
        fn default() -> Self {
            Self::new()
        }
    }

    impl AudioSink for CpalSink {
        fn start(&mut self, sample_rate: u32) -> Result<(), SinkError> {
            if self.command_tx.is_some() {
                self.stop();
            }

            let device = self.open_device()?;
            #[allow(clippy::cast_possible_truncation)]
            let config = cpal::StreamConfig {
                channels: CHANNELS as u16,
                sample_rate: cpal::SampleRate(sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                self.max_queued =
                    (f64::from(sample_rate) * MAX_QUEUED_SECONDS) as usize * CHANNELS;
            }

            let (tx, rx) = mpsc::channel();
            self.command_tx = Some(tx);
            let (status_tx, status_rx) = mpsc::channel();

            Self::spawn_stream_thread(device, config, self.queue.clone(), rx, status_tx);

            status_rx
                .recv()
                .map_err(|_| SinkError::StreamError("audio thread exited".into()))??;

            tracing::info!(sample_rate, "CPAL sink started");
            Ok(())
        }

        fn play(&mut self, samples: &[i16], _frames: usize) -> Result<(), SinkError> {
            if self.command_tx.is_none() {
                return Err(SinkError::Closed);
            }
            while self.queued_samples() > self.max_queued {
                thread::sleep(Duration::from_millis(5));
            }
            self.queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(samples.iter().copied());
            Ok(())
        }

        fn stop(&mut self) {
            if let Some(tx) = self.command_tx.take() {
                let _ = tx.send(StreamCommand::Stop);
            }
            self.flush();
        }

        fn flush(&mut self) {
            self.queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }

        fn delay(&self) -> Option<usize> {
            Some(self.queued_samples() / CHANNELS)
        }

        fn name(&self) -> &'static str {
            "cpal"
        }
    }
}

#[cfg(feature = "audio-cpal")]
pub use implementation::CpalSink;
