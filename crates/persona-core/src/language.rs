//! Output language selection and the localized message catalog.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Fa,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Fa => "fa",
        }
    }

    /// Look up a message key such as `error.noFaceDetected`.
    ///
    /// Unknown keys are returned as-is so that a missing translation is
    /// visible rather than silently blank.
    pub fn message(self, key: &str) -> String {
        MESSAGES
            .iter()
            .find(|(k, _, _)| *k == key)
            .map(|(_, en, fa)| match self {
                Language::En => *en,
                Language::Fa => *fa,
            })
            .unwrap_or(key)
            .to_string()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported language: {0} (expected \"en\" or \"fa\")")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Language::En),
            "fa" | "farsi" | "persian" => Ok(Language::Fa),
            other => Err(UnknownLanguage(other.to_string())),
        }
    }
}

/// (key, English, Persian)
const MESSAGES: &[(&str, &str, &str)] = &[
    ("status.initializing", "Loading AI models...", "در حال بارگذاری مدل‌های هوش مصنوعی..."),
    ("status.ready", "Ready for analysis.", "آماده برای تحلیل."),
    ("status.processing", "Processing...", "در حال پردازش..."),
    ("status.analysisComplete", "Analysis complete.", "تحلیل کامل شد."),
    ("progress.extractingFrames", "Extracting frames...", "در حال استخراج فریم‌ها..."),
    ("progress.analyzingFrame", "Analyzing frames...", "در حال تحلیل فریم‌ها..."),
    ("progress.callingAI", "Calling AI service...", "در حال ارتباط با سرویس هوش مصنوعی..."),
    ("progress.analyzingText", "Analyzing text...", "در حال تحلیل متن..."),
    ("error.title", "Error", "خطا"),
    ("error.apiKeyMissing", "No API key is configured. Set one with `persona key set`.", "کلید API تنظیم نشده است. با `persona key set` آن را تنظیم کنید."),
    ("error.invalidApiKey", "The API key was rejected by the AI service.", "کلید API توسط سرویس هوش مصنوعی پذیرفته نشد."),
    ("error.modelLoadFailed", "Failed to load the emotion detection models.", "بارگذاری مدل‌های تشخیص احساسات ناموفق بود."),
    ("error.modelNotLoaded", "Emotion detection models are not loaded yet.", "مدل‌های تشخیص احساسات هنوز بارگذاری نشده‌اند."),
    ("error.videoLoadFailed", "The video could not be loaded.", "ویدیو قابل بارگذاری نبود."),
    ("error.videoTooLong", "The video is longer than the allowed maximum.", "مدت ویدیو بیشتر از حد مجاز است."),
    ("error.canvasContext", "Frame capture is unavailable (is ffmpeg installed?).", "امکان استخراج فریم وجود ندارد (آیا ffmpeg نصب است؟)."),
    ("error.invalidVideoFile", "The file is not a video.", "فایل انتخاب‌شده ویدیو نیست."),
    ("error.noFaceDetected", "No face was detected in the video.", "هیچ چهره‌ای در ویدیو تشخیص داده نشد."),
    ("error.detectionFailed", "Emotion detection failed while analyzing the video.", "تشخیص احساسات هنگام تحلیل ویدیو ناموفق بود."),
    ("error.aiServiceGeneric", "The AI service request failed.", "درخواست به سرویس هوش مصنوعی ناموفق بود."),
    ("error.textEmpty", "Please enter some text to analyze.", "لطفاً متنی برای تحلیل وارد کنید."),
    ("error.busy", "An analysis is already in progress.", "یک تحلیل در حال انجام است."),
    ("bigFive.openness.label", "Openness", "پذیرا بودن"),
    ("bigFive.conscientiousness.label", "Conscientiousness", "وظیفه‌شناسی"),
    ("bigFive.extraversion.label", "Extraversion", "برون‌گرایی"),
    ("bigFive.agreeableness.label", "Agreeableness", "سازگاری"),
    ("bigFive.neuroticism.label", "Neuroticism", "روان‌رنجوری"),
];
