//! Prompt composition for the three model surfaces. CPU-only; no suspension
//! points here.

use salescoach::domain::{JourneyStage, Language, LogRole};

/// A conversation line for prompting: role plus content, detached from the
/// persisted entry so a store-less turn can still compose a history.
pub type HistoryLine = (LogRole, String);

fn role_label(role: LogRole) -> &'static str {
    match role {
        LogRole::Seller => "SELLER",
        LogRole::FastReply => "COACH",
        LogRole::FastMeta => "COACH-META",
    }
}

fn render_history(summary: Option<&str>, history: &[HistoryLine]) -> String {
    let mut lines = Vec::with_capacity(history.len() + 1);
    if let Some(summary) = summary {
        lines.push(summary.to_string());
    }
    for (role, content) in history {
        lines.push(format!("{}: {}", role_label(*role), content));
    }
    lines.join("\n")
}

fn language_clause(language: Language) -> &'static str {
    match language {
        Language::Pl => "Answer in Polish.",
        Language::En => "Answer in English.",
    }
}

/// Fast Path prompt: grounded coached reply as strict JSON.
pub fn compose_fast(
    summary: Option<&str>,
    history: &[HistoryLine],
    context: &str,
    stage: JourneyStage,
    language: Language,
    note: &str,
) -> String {
    format!(
        "You are a sales coach assisting a salesperson live, mid-conversation.\n\
         Sales journey stage: {stage}.\n\
         {lang}\n\n\
         Knowledge context:\n{context}\n\n\
         Conversation so far:\n{history}\n\n\
         The seller just noted: {note}\n\n\
         Reply with a single JSON object, no prose, with exactly these fields:\n\
         {{\"suggested_response\": string (what the seller should say next),\n\
          \"suggested_questions\": [string] (strategic questions to ask the client),\n\
          \"optional_followup\": string or null (one follow-up move, if any),\n\
          \"seller_questions\": [string] (questions to the seller about body language or tone),\n\
          \"client_style\": one of \"analytical\"|\"driver\"|\"expressive\"|\"amiable\",\n\
          \"confidence_score\": number 0..1,\n\
          \"confidence_reason\": short string}}",
        stage = stage.as_str(),
        lang = language_clause(language),
        context = context,
        history = render_history(summary, history),
        note = note,
    )
}

/// Slow Path prompt: the full deep-analysis document as strict JSON.
pub fn compose_slow(
    history: &[HistoryLine],
    context: &str,
    strategic: Option<&str>,
    language: Language,
) -> String {
    let strategic_block = strategic
        .map(|s| format!("\nMarket intelligence:\n{}\n", s))
        .unwrap_or_default();
    format!(
        "You are a senior sales strategist producing a deep client profile\n\
         from the full conversation below. {lang}\n\n\
         Knowledge context:\n{context}\n{strategic}\n\
         Conversation:\n{history}\n\n\
         Reply with a single JSON object, no prose:\n\
         {{\"overall_confidence\": number 0..100,\n\
          \"journey_stage\": \"Discovery\"|\"Analysis\"|\"Decision\",\n\
          \"modules\": {{\n\
           \"client_summary\": {{\"confidence\": number, \"summary\": string, \"key_facts\": [string]}},\n\
           \"tactical_indicators\": {{\"confidence\": number, \"purchase_temperature\": number 0..100, \"churn_risk\": number 0..100, \"objections\": [string]}},\n\
           \"psychometrics\": {{\"confidence\": number, \"disc\": {{\"dominance\": number, \"influence\": number, \"steadiness\": number, \"conscientiousness\": number}}, \"big_five\": {{\"openness\": number, \"conscientiousness\": number, \"extraversion\": number, \"agreeableness\": number, \"neuroticism\": number}}, \"schwartz_values\": [{{\"name\": string, \"score\": number}}]}},\n\
           \"motivation\": {{\"confidence\": number, \"drivers\": [{{\"name\": string, \"strength\": number, \"evidence\": [string]}}]}},\n\
           \"predictive_paths\": {{\"confidence\": number, \"paths\": [{{\"scenario\": string, \"probability\": number 0..1, \"next_best_action\": string}}]}},\n\
           \"playbook\": {{\"confidence\": number, \"plays\": [{{\"name\": string, \"trigger\": string, \"line\": string}}]}},\n\
           \"decision_makers\": {{\"confidence\": number, \"actors\": [{{\"role\": string, \"influence\": number, \"stance\": string}}]}}\n\
          }}}}",
        lang = language_clause(language),
        context = context,
        strategic = strategic_block,
        history = render_history(None, history),
    )
}

/// Refinement prompt: correct a disliked suggestion.
pub fn compose_refine(
    original_input: &str,
    bad_suggestion: &str,
    criticism: &str,
    language: Language,
) -> String {
    format!(
        "A salesperson disliked your previous coaching suggestion. {lang}\n\n\
         Seller's original note: {original}\n\
         Rejected suggestion: {bad}\n\
         Seller's criticism: {criticism}\n\n\
         Produce an improved suggestion that addresses the criticism.\n\
         Reply with a single JSON object, no prose:\n\
         {{\"refined_suggestion\": string}}",
        lang = language_clause(language),
        original = original_input,
        bad = bad_suggestion,
        criticism = criticism,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_prompt_carries_all_sections() {
        let history = vec![
            (LogRole::Seller, "client asks about range".to_string()),
            (LogRole::FastReply, "mention winter figures".to_string()),
        ];
        let prompt = compose_fast(
            Some("[2 earlier entries omitted]"),
            &history,
            "winter range is 420 km",
            JourneyStage::Analysis,
            Language::En,
            "client is worried about charging",
        );
        assert!(prompt.contains("Analysis"));
        assert!(prompt.contains("winter range is 420 km"));
        assert!(prompt.contains("[2 earlier entries omitted]"));
        assert!(prompt.contains("SELLER: client asks about range"));
        assert!(prompt.contains("suggested_response"));
        assert!(prompt.contains("client is worried about charging"));
    }

    #[test]
    fn slow_prompt_omits_absent_strategic_block() {
        let prompt = compose_slow(&[], "ctx", None, Language::Pl);
        assert!(!prompt.contains("Market intelligence"));
        assert!(prompt.contains("overall_confidence"));

        let enriched = compose_slow(&[], "ctx", Some("fuel prices up"), Language::Pl);
        assert!(enriched.contains("Market intelligence"));
        assert!(enriched.contains("fuel prices up"));
    }

    #[test]
    fn refine_prompt_quotes_criticism() {
        let prompt = compose_refine("note", "bad line", "too pushy", Language::En);
        assert!(prompt.contains("too pushy"));
        assert!(prompt.contains("refined_suggestion"));
    }
}
