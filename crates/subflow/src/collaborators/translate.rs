//! DeepL and OpenAI chat translation backends.
//!
//! Subtitles are translated cue by cue in batches of [`BATCH_SIZE`]; empty
//! cues are never sent. With more than one segment worker, cues are instead
//! translated concurrently and put back in place by index. The O3 service
//! re-asks the model to check each translation and retranslates up to
//! [`MAX_VERIFY_RETRIES`] times.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::unbounded;
use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{Translation, Translator};
use crate::config::TranslationService;
use crate::error::CollaboratorError;
use crate::secrets::KeySource;
use crate::subtitles::{parse_srt_segments, reconstruct_srt};

pub const BATCH_SIZE: usize = 10;
pub const MAX_VERIFY_RETRIES: usize = 3;

const DEEPL_URL: &str = "https://api-free.deepl.com/v2/translate";
const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const CHAT_MODEL: &str = "o3-mini";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const TRANSLATOR_ROLE: &str = "You are a highly skilled translator.";
const CHECKER_ROLE: &str = "You are a translation quality checker.";

/// `<dir>/<stem>_translated_<lang>.srt` next to the source subtitle.
pub fn translated_path(srt: &Path, target_language: &str) -> PathBuf {
    let stem = srt
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    srt.with_file_name(format!("{}_translated_{}.srt", stem, target_language))
}

pub fn translation_prompt(text: &str, target_language: &str) -> String {
    format!(
        "Note: The automatic transcription may contain errors. \
         Please ensure the translated sentence makes sense in context, \
         correcting any mistakes as needed. \
         Provide an accurate translation that preserves the original meaning, \
         without any additional comments or formatting. \
         The translation should be in {}:\n\n{}",
        target_language, text
    )
}

pub fn verification_prompt(segment: &str, target_language: &str) -> String {
    format!(
        "Verify if the following translation is completely in {} \
         and has no words from the original language. \
         Return 'yes' if it is accurate and 'no' otherwise:\n\n{}",
        target_language, segment
    )
}

/// Translates every text in batches, keeping blank texts blank.
pub fn translate_texts<F>(texts: &[String], mut translate_one: F) -> Result<Vec<String>, CollaboratorError>
where
    F: FnMut(&str) -> Result<String, CollaboratorError>,
{
    let mut translated = Vec::with_capacity(texts.len());
    let batches = texts.len().div_ceil(BATCH_SIZE);

    for (index, batch) in texts.chunks(BATCH_SIZE).enumerate() {
        debug!(batch = index + 1, of = batches, "translating batch");
        for text in batch {
            if text.trim().is_empty() {
                translated.push(String::new());
            } else {
                translated.push(translate_one(text)?);
            }
        }
    }

    Ok(translated)
}

/// Translates texts on `workers` threads. Output order follows input order
/// whatever order the calls finish in; blank texts stay blank. After the
/// first error no new texts are started and the lowest-index error is
/// returned.
pub fn translate_texts_parallel<F>(
    texts: &[String],
    workers: usize,
    translate_one: F,
) -> Result<Vec<String>, CollaboratorError>
where
    F: Fn(&str) -> Result<String, CollaboratorError> + Sync,
{
    let (task_tx, task_rx) = unbounded::<(usize, &str)>();
    for (index, text) in texts.iter().enumerate() {
        if !text.trim().is_empty() {
            let _ = task_tx.send((index, text.as_str()));
        }
    }
    drop(task_tx);

    let (result_tx, result_rx) = unbounded();
    let failed = AtomicBool::new(false);
    let workers = workers.clamp(1, texts.len().max(1));
    debug!(workers, texts = texts.len(), "translating segments in parallel");

    thread::scope(|scope| {
        for _ in 0..workers {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let failed = &failed;
            let translate_one = &translate_one;
            scope.spawn(move || {
                for (index, text) in task_rx.iter() {
                    if failed.load(Ordering::Relaxed) {
                        break;
                    }
                    let result = translate_one(text);
                    if result.is_err() {
                        failed.store(true, Ordering::Relaxed);
                    }
                    let _ = result_tx.send((index, result));
                }
            });
        }
    });
    drop(result_tx);

    let mut translated = vec![String::new(); texts.len()];
    let mut first_error: Option<(usize, CollaboratorError)> = None;
    for (index, result) in result_rx.iter() {
        match result {
            Ok(text) => translated[index] = text,
            Err(e) => {
                if first_error.as_ref().is_none_or(|(i, _)| index < *i) {
                    first_error = Some((index, e));
                }
            }
        }
    }

    match first_error {
        Some((_, e)) => Err(e),
        None => Ok(translated),
    }
}

/// Retranslates while `verify` rejects the result, at most
/// [`MAX_VERIFY_RETRIES`] extra times. The last attempt is kept either way.
pub fn translate_verified<T, V>(mut translate: T, mut verify: V) -> Result<String, CollaboratorError>
where
    T: FnMut() -> Result<String, CollaboratorError>,
    V: FnMut(&str) -> Result<bool, CollaboratorError>,
{
    let mut translation = translate()?;
    let mut retries = MAX_VERIFY_RETRIES;

    while !verify(&translation)? {
        if retries == 0 {
            warn!("translation still failed verification, keeping last attempt");
            break;
        }
        translation = translate()?;
        retries -= 1;
    }

    Ok(translation)
}

#[derive(Debug, Deserialize)]
struct DeepLResponse {
    translations: Vec<DeepLTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeepLTranslation {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct HttpTranslator {
    client: Client,
    deepl_key: KeySource,
    openai_key: KeySource,
    deepl_url: String,
    openai_url: String,
    segment_workers: usize,
}

impl HttpTranslator {
    pub fn new(deepl_key: KeySource, openai_key: KeySource) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CollaboratorError::Translation(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            deepl_key,
            openai_key,
            deepl_url: DEEPL_URL.to_string(),
            openai_url: OPENAI_URL.to_string(),
            segment_workers: 1,
        })
    }

    /// Segments translated at once. `1` keeps the serial batch mode.
    pub fn with_segment_workers(mut self, workers: usize) -> Self {
        self.segment_workers = workers.max(1);
        self
    }

    fn translate_all<F>(&self, texts: &[String], translate_one: F) -> Result<Vec<String>, CollaboratorError>
    where
        F: Fn(&str) -> Result<String, CollaboratorError> + Sync,
    {
        if self.segment_workers > 1 {
            translate_texts_parallel(texts, self.segment_workers, translate_one)
        } else {
            translate_texts(texts, translate_one)
        }
    }

    /// Points both backends at other base URLs (self-hosted proxies, tests).
    pub fn with_endpoints(mut self, deepl_url: impl Into<String>, openai_url: impl Into<String>) -> Self {
        self.deepl_url = deepl_url.into();
        self.openai_url = openai_url.into();
        self
    }

    fn key(source: &KeySource, service: &str) -> Result<SecretString, CollaboratorError> {
        source
            .resolve()
            .map_err(|e| CollaboratorError::Translation(format!("{} key: {}", service, e)))?
            .ok_or_else(|| CollaboratorError::Translation(format!("no {} API key configured", service)))
    }

    fn translate_deepl(&self, key: &SecretString, text: &str, target_language: &str) -> Result<String, CollaboratorError> {
        let target = target_language.to_uppercase();
        let response = self
            .client
            .post(&self.deepl_url)
            .header("Authorization", format!("DeepL-Auth-Key {}", key.expose_secret()))
            .form(&[("text", text), ("target_lang", target.as_str())])
            .send()
            .map_err(|e| CollaboratorError::Translation(format!("DeepL request: {}", e)))?;

        let body: DeepLResponse = read_json(response)?;
        body.translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or_else(|| CollaboratorError::Translation("DeepL returned no translation".to_string()))
    }

    fn chat(&self, key: &SecretString, role: &str, prompt: &str) -> Result<String, CollaboratorError> {
        let payload = json!({
            "model": CHAT_MODEL,
            "messages": [
                { "role": "assistant", "content": role },
                { "role": "user", "content": prompt },
            ],
            "reasoning_effort": "low",
        });

        let response = self
            .client
            .post(&self.openai_url)
            .bearer_auth(key.expose_secret())
            .json(&payload)
            .send()
            .map_err(|e| CollaboratorError::Translation(format!("OpenAI request: {}", e)))?;

        let body: ChatResponse = read_json(response)?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CollaboratorError::Translation("OpenAI returned no message".to_string()))
    }

    fn verify(&self, key: &SecretString, segment: &str, target_language: &str) -> Result<bool, CollaboratorError> {
        let answer = self.chat(key, CHECKER_ROLE, &verification_prompt(segment, target_language))?;
        Ok(answer.to_lowercase().contains("yes"))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::blocking::Response,
) -> Result<T, CollaboratorError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(CollaboratorError::TranslationHttp {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json()
        .map_err(|e| CollaboratorError::Translation(format!("unreadable response: {}", e)))
}

impl Translator for HttpTranslator {
    fn translate(
        &self,
        srt: &Path,
        target_language: &str,
        service: TranslationService,
    ) -> Result<Translation, CollaboratorError> {
        let content = fs::read_to_string(srt).map_err(|e| CollaboratorError::io(srt, e))?;
        let segments = parse_srt_segments(&content);
        let texts: Vec<String> = segments.iter().map(|s| s.text.clone()).collect();

        info!(
            service = %service,
            language = target_language,
            segments = segments.len(),
            workers = self.segment_workers,
            "translating subtitles"
        );

        let translated = match service {
            TranslationService::DeepL => {
                let key = Self::key(&self.deepl_key, "DeepL")?;
                self.translate_all(&texts, |text| self.translate_deepl(&key, text, target_language))?
            }
            TranslationService::ChatGpt => {
                let key = Self::key(&self.openai_key, "OpenAI")?;
                self.translate_all(&texts, |text| {
                    self.chat(&key, TRANSLATOR_ROLE, &translation_prompt(text, target_language))
                })?
            }
            TranslationService::O3 => {
                let key = Self::key(&self.openai_key, "OpenAI")?;
                self.translate_all(&texts, |text| {
                    translate_verified(
                        || self.chat(&key, TRANSLATOR_ROLE, &translation_prompt(text, target_language)),
                        |candidate| self.verify(&key, candidate, target_language),
                    )
                })?
            }
        };

        let translated_content = reconstruct_srt(&segments, &translated);
        let path = translated_path(srt, target_language);
        fs::write(&path, &translated_content).map_err(|e| CollaboratorError::io(&path, e))?;

        Ok(Translation {
            path,
            content: translated_content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_translated_path() {
        assert_eq!(
            translated_path(Path::new("/out/video/video.srt"), "FR"),
            PathBuf::from("/out/video/video_translated_FR.srt")
        );
        assert_eq!(
            translated_path(Path::new("video_vocal.srt"), "DE"),
            PathBuf::from("video_vocal_translated_DE.srt")
        );
    }

    #[test]
    fn test_translate_texts_keeps_blank_and_order() {
        let texts: Vec<String> = (0..23)
            .map(|i| if i % 7 == 0 { "  ".to_string() } else { format!("t{}", i) })
            .collect();
        let mut calls = 0;

        let out = translate_texts(&texts, |text| {
            calls += 1;
            Ok(text.to_uppercase())
        })
        .unwrap();

        assert_eq!(out.len(), 23);
        assert_eq!(out[0], "");
        assert_eq!(out[1], "T1");
        assert_eq!(out[22], "T22");
        assert_eq!(calls, 23 - 4);
    }

    #[test]
    fn test_translate_texts_stops_on_error() {
        let texts = vec!["a".to_string(), "b".to_string()];
        let err = translate_texts(&texts, |_| Err(CollaboratorError::Translation("down".into())))
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Translation(m) if m == "down"));
    }

    #[test]
    fn test_parallel_translation_keeps_input_order() {
        let texts: Vec<String> = (0..30)
            .map(|i| if i % 9 == 0 { String::new() } else { format!("t{}", i) })
            .collect();

        // Earlier cues sleep longer, so they finish last.
        let out = translate_texts_parallel(&texts, 4, |text| {
            let n: u64 = text[1..].parse().unwrap();
            thread::sleep(Duration::from_millis(30 - n));
            Ok(text.to_uppercase())
        })
        .unwrap();

        let expected: Vec<String> = texts.iter().map(|t| t.to_uppercase()).collect();
        assert_eq!(out, expected);
        assert_eq!(out[0], "");
        assert_eq!(out[29], "T29");
    }

    #[test]
    fn test_parallel_translation_reports_error() {
        let texts: Vec<String> = (0..12).map(|i| format!("t{}", i)).collect();
        let err = translate_texts_parallel(&texts, 3, |text| {
            if text == "t5" {
                Err(CollaboratorError::Translation("quota".into()))
            } else {
                Ok(text.to_string())
            }
        })
        .unwrap_err();
        assert!(matches!(err, CollaboratorError::Translation(m) if m == "quota"));
    }

    #[test]
    fn test_parallel_translation_of_nothing() {
        let out = translate_texts_parallel(&[], 4, |t| Ok(t.to_string())).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_verified_accepts_first_good_attempt() {
        let mut attempts = 0;
        let result = translate_verified(
            || {
                attempts += 1;
                Ok(format!("attempt {}", attempts))
            },
            |candidate| Ok(candidate == "attempt 2"),
        )
        .unwrap();
        assert_eq!(result, "attempt 2");
    }

    #[test]
    fn test_verified_gives_up_after_retries() {
        let mut attempts = 0;
        let result = translate_verified(
            || {
                attempts += 1;
                Ok(format!("attempt {}", attempts))
            },
            |_| Ok(false),
        )
        .unwrap();
        assert_eq!(result, format!("attempt {}", MAX_VERIFY_RETRIES + 1));
    }

    #[test]
    fn test_prompts_name_the_language() {
        assert!(translation_prompt("hello", "FR").ends_with("The translation should be in FR:\n\nhello"));
        assert!(verification_prompt("bonjour", "FR").starts_with("Verify if the following translation is completely in FR and"));
    }

    #[test]
    fn test_missing_key_fails_before_any_request() {
        let dir = TempDir::new().unwrap();
        let srt = dir.path().join("video.srt");
        fs::write(&srt, "1\n00:00:00,000 --> 00:00:01,000\nHello\n").unwrap();

        let translator = HttpTranslator::new(KeySource::default(), KeySource::default()).unwrap();
        let err = translator
            .translate(&srt, "FR", TranslationService::DeepL)
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Translation(m) if m.contains("no DeepL API key")));
        assert!(!translated_path(&srt, "FR").exists());
    }
}
