use std::fmt::Write;

use super::{GenerationPreferences, StoryRequest};

/// Compile a story request into the instruction prompt sent to the model.
///
/// Clauses are appended in a fixed order (language mix, style, length,
/// vocabulary, structure, topic) and only when the matching option is set.
/// The model and the extraction step both depend on this ordering.
pub fn build_prompt(request: &StoryRequest) -> String {
    let default_preferences = GenerationPreferences::default();
    let preferences = request.preferences.as_ref().unwrap_or(&default_preferences);
    let config = request.config.as_ref();

    let mut prompt = format!(
        "Create a story based on this prompt: \"{}\"\n\n",
        request.prompt
    );

    if let Some(mix) = &preferences.language_mix {
        let _ = write!(
            prompt,
            "Language Requirements:\n\
             - Use {}% Vietnamese and {}% English\n\
             - Base language: {}\n\
             - Target language: {}\n",
            mix.ratio,
            100 - u32::from(mix.ratio.min(100)),
            mix.base_language,
            mix.target_language,
        );
        if preferences.format.as_ref().is_some_and(|f| f.bold_english) {
            prompt.push_str("- Make English words bold using **word** format\n");
        }
        prompt.push('\n');
    }

    if let Some(style) = &preferences.style {
        let _ = write!(
            prompt,
            "Style Requirements:\n\
             - Storytelling style: {}\n\
             - Tone: {}\n\
             - Readability level: {}\n\n",
            style.storytelling, style.tone, style.readability_level,
        );
    }

    let _ = write!(prompt, "Length: {}\n\n", preferences.length.word_range());

    if let Some(vocab) = config
        .and_then(|c| c.vocab_focus.as_ref())
        .filter(|v| !v.is_empty())
    {
        let _ = write!(
            prompt,
            "Key vocabulary to include: {}\n\n",
            vocab.join(", ")
        );
    }

    if let Some(structure) = &preferences.structure {
        let _ = writeln!(
            prompt,
            "Structure Requirements:\n- Include these sections: {}",
            structure.sections.join(", ")
        );
        if structure.include_quiz {
            prompt.push_str(
                "- Add a mini quiz with 3 multiple choice questions using the quiz_questions field\n",
            );
        }
        if structure.include_glossary {
            prompt.push_str("- Include a glossary of key terms using the glossary field\n");
        }
        prompt.push('\n');
    }

    if let Some(topic) = config.and_then(|c| c.core_topic.as_ref()) {
        let _ = write!(prompt, "Core topic focus: {}\n\n", topic);
    }

    prompt.push_str(
        "Please create an engaging story that follows all these requirements. \n\
         Use the create_story function to provide structured output with proper title, \
         story content, and any requested additional sections like quiz or glossary.",
    );

    prompt
}
