/// Builds the repurposing prompt for a piece of source content. The
/// instruction pins the reply to a JSON object with exactly the four
/// keys the strict parser expects.
pub fn build_prompt(source: &str) -> String {
    format!(
        r#"You are a content repurposing expert. Take the following content and create 4 different formats:

1. SOCIAL MEDIA POSTS (Twitter, Instagram, Facebook) - 3-5 engaging posts with hashtags
2. EMAIL NEWSLETTER - A professional newsletter format with subject line
3. LINKEDIN THREAD - A professional LinkedIn thread (5-7 tweets)
4. YOUTUBE SCRIPT - A YouTube Shorts script (60-90 seconds)

Content to repurpose:
{source}

Respond with JSON only, no surrounding prose, using these exact keys:
{{
  "social": "Social media posts here...",
  "email": "Email newsletter here...",
  "linkedin": "LinkedIn thread here...",
  "youtube": "YouTube script here..."
}}"#
    )
}
