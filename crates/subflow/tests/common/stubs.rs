//! Stub collaborators standing in for the external tools.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use subflow::collaborators::{
    translated_path, AudioExtractor, ResolvedVideo, StemSeparator, Stems, Transcriber,
    Translation, Translator, VideoSourceResolver,
};
use subflow::config::TranslationService;
use subflow::error::CollaboratorError;
use subflow::JobSource;

/// Ordered log of collaborator calls, e.g. `start:transcribe:video`.
#[derive(Clone, Default)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Labels of `start:` entries, in call order.
    pub fn started(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| e.strip_prefix("start:").map(str::to_string))
            .collect()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn contains_prefix(&self, prefix: &str) -> bool {
        self.entries().iter().any(|e| e.starts_with(prefix))
    }
}

fn file_label(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Lets a test hold a collaborator call until it says go.
#[derive(Clone)]
pub struct Gate {
    entered_tx: Sender<()>,
    entered_rx: Receiver<()>,
    release_tx: Sender<()>,
    release_rx: Receiver<()>,
}

impl Gate {
    pub fn new() -> Self {
        let (entered_tx, entered_rx) = unbounded();
        let (release_tx, release_rx) = unbounded();
        Self {
            entered_tx,
            entered_rx,
            release_tx,
            release_rx,
        }
    }

    /// Called by the stub: announce arrival, then block until released.
    pub fn pass(&self) {
        self.entered_tx.send(()).unwrap();
        self.release_rx.recv().unwrap();
    }

    pub fn wait_entered(&self) {
        self.entered_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("collaborator never reached the gate");
    }

    pub fn open(&self) {
        self.release_tx.send(()).unwrap();
    }
}

pub struct GatedResolver {
    inner: Arc<dyn VideoSourceResolver>,
    gate: Gate,
}

impl GatedResolver {
    pub fn new(inner: Arc<dyn VideoSourceResolver>, gate: Gate) -> Self {
        Self { inner, gate }
    }
}

impl VideoSourceResolver for GatedResolver {
    fn resolve(
        &self,
        source: &JobSource,
        download_dir: &Path,
    ) -> Result<ResolvedVideo, CollaboratorError> {
        self.gate.pass();
        self.inner.resolve(source, download_dir)
    }
}

/// Panics instead of resolving, as a misbehaving backend might.
pub struct PanickingResolver;

impl VideoSourceResolver for PanickingResolver {
    fn resolve(
        &self,
        _source: &JobSource,
        _download_dir: &Path,
    ) -> Result<ResolvedVideo, CollaboratorError> {
        panic!("resolver exploded");
    }
}

pub struct StubExtractor {
    recorder: Recorder,
    gate: Option<Gate>,
}

impl StubExtractor {
    pub fn new(recorder: Recorder) -> Self {
        Self {
            recorder,
            gate: None,
        }
    }

    pub fn gated(recorder: Recorder, gate: Gate) -> Self {
        Self {
            recorder,
            gate: Some(gate),
        }
    }
}

impl AudioExtractor for StubExtractor {
    fn extract(&self, video: &Path, audio_out: &Path) -> Result<PathBuf, CollaboratorError> {
        self.recorder.record("start:extract");
        if let Some(gate) = &self.gate {
            gate.pass();
        }
        assert!(video.is_file(), "extractor got a missing video");
        fs::write(audio_out, b"audio").map_err(|e| CollaboratorError::io(audio_out, e))?;
        self.recorder.record("end:extract");
        Ok(audio_out.to_path_buf())
    }
}

pub struct StubSeparator {
    recorder: Recorder,
    fail: bool,
}

impl StubSeparator {
    pub fn new(recorder: Recorder) -> Self {
        Self {
            recorder,
            fail: false,
        }
    }

    pub fn failing(recorder: Recorder) -> Self {
        Self {
            recorder,
            fail: true,
        }
    }
}

impl StemSeparator for StubSeparator {
    fn separate(
        &self,
        _audio: &Path,
        out_dir: &Path,
        _use_gpu: bool,
    ) -> Result<Stems, CollaboratorError> {
        self.recorder.record("start:separate");
        if self.fail {
            self.recorder.record("fail:separate");
            return Err(CollaboratorError::Separation("model crashed".to_string()));
        }
        let vocals = out_dir.join("vocals.wav");
        let accompaniment = out_dir.join("accompaniment.wav");
        fs::write(&vocals, b"vocals").map_err(|e| CollaboratorError::io(&vocals, e))?;
        fs::write(&accompaniment, b"music").map_err(|e| CollaboratorError::io(&accompaniment, e))?;
        self.recorder.record("end:separate");
        Ok(Stems {
            vocals,
            accompaniment,
        })
    }
}

/// Writes `<base>.srt` with one cue naming the base. Fails for bases whose
/// file name equals `fail_on`.
pub struct StubTranscriber {
    recorder: Recorder,
    fail_on: Option<String>,
}

impl StubTranscriber {
    pub fn new(recorder: Recorder) -> Self {
        Self {
            recorder,
            fail_on: None,
        }
    }

    pub fn failing_on(recorder: Recorder, base_name: &str) -> Self {
        Self {
            recorder,
            fail_on: Some(base_name.to_string()),
        }
    }
}

impl Transcriber for StubTranscriber {
    fn transcribe(
        &self,
        audio: &Path,
        base: &Path,
        _model: &str,
        _use_gpu: bool,
    ) -> Result<PathBuf, CollaboratorError> {
        let name = base
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.recorder.record(format!("start:transcribe:{}", name));
        assert!(audio.is_file(), "transcriber got a missing audio file");

        if self.fail_on.as_deref() == Some(name.as_str()) {
            self.recorder.record(format!("fail:transcribe:{}", name));
            return Err(CollaboratorError::Transcription("model not loaded".to_string()));
        }

        let srt = base.with_file_name(format!("{}.srt", name));
        let content = format!(
            "1\n00:00:00,000 --> 00:00:01,000\nHello from {}\n\n2\n00:00:01,000 --> 00:00:02,000\n\n",
            name
        );
        fs::write(&srt, content).map_err(|e| CollaboratorError::io(&srt, e))?;
        self.recorder.record(format!("end:transcribe:{}", name));
        Ok(base.to_path_buf())
    }
}

/// Prefixes each line with the language. Does not write the file itself, so
/// the step has to. Optional per-file delays reorder completions.
pub struct StubTranslator {
    recorder: Recorder,
    delays: Vec<(String, Duration)>,
    fail: bool,
}

impl StubTranslator {
    pub fn new(recorder: Recorder) -> Self {
        Self {
            recorder,
            delays: Vec::new(),
            fail: false,
        }
    }

    pub fn with_delay(mut self, srt_stem: &str, delay: Duration) -> Self {
        self.delays.push((srt_stem.to_string(), delay));
        self
    }

    pub fn failing(recorder: Recorder) -> Self {
        Self {
            recorder,
            delays: Vec::new(),
            fail: true,
        }
    }
}

impl Translator for StubTranslator {
    fn translate(
        &self,
        srt: &Path,
        target_language: &str,
        _service: TranslationService,
    ) -> Result<Translation, CollaboratorError> {
        let label = file_label(srt);
        self.recorder.record(format!("start:translate:{}", label));

        if self.fail {
            return Err(CollaboratorError::TranslationHttp {
                status: 456,
                body: "quota exceeded".to_string(),
            });
        }
        if let Some((_, delay)) = self.delays.iter().find(|(stem, _)| *stem == label) {
            std::thread::sleep(*delay);
        }

        let source = fs::read_to_string(srt).map_err(|e| CollaboratorError::io(srt, e))?;
        let content = source
            .lines()
            .map(|line| {
                if line.starts_with("Hello") {
                    format!("[{}] {}", target_language, line)
                } else {
                    line.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        self.recorder.record(format!("end:translate:{}", label));
        Ok(Translation {
            path: translated_path(srt, target_language),
            content,
        })
    }
}
