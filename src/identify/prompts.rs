// Identification prompt builders
//
// Every tier uses the same payload contract so the parser doesn't care which
// rung answered. Higher tiers get the same prompt; the extra quality comes
// from the model and thinking budget, not from prompt variation.

use super::types::RequestContext;

const PAYLOAD_CONTRACT: &str = r#"Respond with only a JSON object in this exact shape:
{"producer": "<winery or producer>", "wineName": "<wine name or cuvee>", "vintage": <year or null>, "region": "<region or appellation, or null>", "confidence": <0-100>}

Set confidence to how certain you are of the identification as a whole. Use null for any field you cannot determine; never guess a vintage."#;

/// Prompt for a text query (a typed wine name or description).
pub fn text_identification(query: &str, context: Option<&RequestContext>) -> String {
    let mut prompt = String::from(
        "You are a wine identification expert. Identify the specific wine the user is referring to.\n\n",
    );
    push_context(&mut prompt, context);
    prompt.push_str("User input: ");
    prompt.push_str(query);
    prompt.push_str("\n\n");
    prompt.push_str(PAYLOAD_CONTRACT);
    prompt
}

/// Prompt accompanying a label photograph.
pub fn image_identification(context: Option<&RequestContext>) -> String {
    let mut prompt = String::from(
        "You are a wine identification expert. Identify the wine from this label photograph. Read the label text carefully; prefer what is printed over what is famous.\n\n",
    );
    push_context(&mut prompt, context);
    prompt.push_str(PAYLOAD_CONTRACT);
    prompt
}

fn push_context(prompt: &mut String, context: Option<&RequestContext>) {
    let Some(context) = context else { return };
    if let Some(phase) = &context.phase {
        prompt.push_str(&format!("Conversation phase: {}\n", phase));
    }
    if let Some(prior) = &context.prior {
        prompt.push_str(&format!(
            "An earlier pass guessed producer={:?} wine={:?} vintage={:?} at confidence {}. Confirm or correct it.\n",
            prior.producer, prior.wine_name, prior.vintage, prior.confidence
        ));
    }
    prompt.push('\n');
}
