//! Prompt templates and fixed fallback strings, per language.

use crate::types::{EmotionVector, Profile};
use crate::Language;

/// Profile returned when the generative service gives nothing usable.
pub fn default_profile(lang: Language) -> Profile {
    Profile::neutral(default_explanation(lang))
}

pub fn default_explanation(lang: Language) -> &'static str {
    match lang {
        Language::En => "Detailed explanation unavailable.",
        Language::Fa => "توضیح دقیق در دسترس نیست.",
    }
}

pub fn description_unavailable(lang: Language) -> &'static str {
    match lang {
        Language::En => "Could not generate video description.",
        Language::Fa => "تولید توضیحات ویدیو با خطا مواجه شد.",
    }
}

pub fn no_frames_for_description(lang: Language) -> &'static str {
    match lang {
        Language::En => "No frames provided for analysis.",
        Language::Fa => "هیچ فریمی برای تحلیل ارائه نشده است.",
    }
}

/// Personality prompt built from averaged facial emotion data.
pub fn emotion_profile(emotions: &EmotionVector, lang: Language) -> String {
    let data = emotions.summary();
    match lang {
        Language::En => format!(
            "You are an AI assistant adopting the persona of an expert psychological analyst.
Your task is to provide an illustrative Big Five personality profile (Openness, Conscientiousness, Extraversion, Agreeableness, Neuroticism) based *solely* on the following averaged facial emotion data:
Averaged Facial Emotion Data: {data}.

{}",
            json_contract_en("This explanation should detail how the specific combination of emotions contributes to the trait score.", "An integer score from 0 to 100.")
        ),
        Language::Fa => format!(
            "شما یک دستیار هوش مصنوعی در نقش یک تحلیلگر روانشناس خبره هستید.
وظیفه شما ارائه یک پروفایل شخصیتی پنج بزرگ (پذیرا بودن، وظیفه‌شناسی، برون‌گرایی، سازگاری، روان‌رنجوری) *فقط* بر اساس داده‌های میانگین احساسات چهره زیر است:
داده‌های میانگین احساسات چهره: {data}.

{}",
            json_contract_fa("این توضیح باید جزئیات دهد که چگونه ترکیب خاص احساسات به امتیاز آن ویژگی کمک می‌کند.", "یک عدد صحیح از 0 تا 100.")
        ),
    }
}

/// Personality prompt built from user-supplied self-description.
pub fn text_profile(text: &str, lang: Language) -> String {
    match lang {
        Language::En => format!(
            "You are an AI assistant adopting the persona of an expert psychological analyst.
Your task is to provide an illustrative Big Five personality profile (Openness, Conscientiousness, Extraversion, Agreeableness, Neuroticism) based on the following self-descriptive text provided by a user:
User Text: \"{text}\"

{}",
            json_contract_en("It should justify your reasoning based on the user's text.", "An integer score from 0 to 100, estimating the level of that trait.")
        ),
        Language::Fa => format!(
            "شما یک دستیار هوش مصنوعی در نقش یک تحلیلگر روانشناس خبره هستید.
وظیفه شما ارائه یک پروفایل شخصیتی پنج بزرگ (پذیرا بودن، وظیفه‌شناسی، برون‌گرایی، سازگاری، روان‌رنجوری) بر اساس متن خود-توصیفی زیر است که توسط یک کاربر نوشته شده:
متن کاربر: \"{text}\"

{}",
            json_contract_fa("این توضیح باید استدلال شما را بر اساس بخش‌هایی از متن کاربر توجیه کند.", "یک عدد صحیح از 0 تا 100 که تخمین شما از سطح آن ویژگی شخصیتی است.")
        ),
    }
}

/// Instruction accompanying the sampled frames on the description path.
pub fn frame_description(lang: Language) -> &'static str {
    match lang {
        Language::En => "Analyze the following sequence of frames. Provide a concise, one-sentence, general description of the main subject and action in English. Focus on what a person is doing (e.g., 'A person is smiling while talking to the camera'). Do not mention emotions or personality. Do not add any introductory text.",
        Language::Fa => "فریم‌های ویدیویی زیر را تحلیل کن. یک توصیف کلی، یک جمله‌ای و مختصر از سوژه اصلی و کاری که انجام می‌دهد به زبان فارسی ارائه بده. تمرکز بر روی کاری باشد که شخص انجام می‌دهد (مثلا: 'شخصی در حال لبخند زدن به دوربین است'). به احساسات یا شخصیت اشاره نکن. هیچ متن مقدمه‌ای اضافه نکن.",
    }
}

fn json_contract_en(explanation_focus: &str, score_rule: &str) -> String {
    format!(
        "Your response MUST be a valid JSON object.
The JSON object must have keys 'openness', 'conscientiousness', 'extraversion', 'agreeableness', and 'neuroticism'.
Each key's value must be an object with two sub-keys:
1. 'score': {score_rule}
2. 'explanation': A concise, insightful explanation (around 15-25 words) for the score, written in English. {explanation_focus}

Do not include any other text, remarks, or markdown formatting around the JSON object."
    )
}

fn json_contract_fa(explanation_focus: &str, score_rule: &str) -> String {
    format!(
        "پاسخ شما باید یک شیء JSON معتبر باشد.
این شیء JSON باید کلیدهای 'openness', 'conscientiousness', 'extraversion', 'agreeableness', و 'neuroticism' را داشته باشد.
مقدار هر کلید باید یک شیء با دو کلید داخلی باشد:
1. 'score': {score_rule}
2. 'explanation': یک توضیح کوتاه و روشنگر (حدود 15-25 کلمه) برای امتیاز، به زبان فارسی. {explanation_focus}

هیچ متن، توضیح یا قالب‌بندی دیگری به جز شیء JSON در پاسخ خود نیاورید."
    )
}
