// Prompt constants for resume assessment.
// Reuses cross-cutting fragments from llm_client::prompts.

use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::models::role::Role;

/// Persona and ground rules for the assessing model.
pub const ASSESSMENT_PERSONA: &str = "You are an expert technical recruiter who analyzes resumes. \
    Analyze the resume against the provided job requirements. \
    Be lenient with AI/ML candidates who show strong potential. \
    Consider project experience as valid experience. \
    Value hands-on experience with key technologies.";

/// Assessment prompt template. Replace `{role_title}`, `{requirements}` and
/// `{resume_text}` before sending.
pub const ASSESSMENT_PROMPT_TEMPLATE: &str = r#"Please analyze this resume against the following requirements for the {role_title} role.

Role Requirements:
{requirements}

Resume Text:
{resume_text}

Your response must be a valid JSON object with this EXACT schema:
{
  "selected": true,
  "feedback": "Detailed feedback explaining the decision",
  "matching_skills": ["skill1", "skill2"],
  "missing_skills": ["skill3", "skill4"],
  "experience_level": "junior"
}

"selected" is true when the candidate should move to interview, false otherwise.
"experience_level" is one of "junior", "mid", "senior".

Evaluation criteria:
1. Match at least 70% of required skills
2. Consider both theoretical knowledge and practical experience
3. Value project experience and real-world applications
4. Consider transferable skills from similar technologies
5. Look for evidence of continuous learning and adaptability

Important: Return ONLY the JSON object without any markdown formatting or backticks."#;

pub fn system_prompt() -> String {
    format!("{ASSESSMENT_PERSONA} {JSON_ONLY_SYSTEM}")
}

pub fn build_prompt(resume_text: &str, role: &Role) -> String {
    let requirements = role
        .requirements
        .iter()
        .map(|r| format!("- {r}"))
        .collect::<Vec<_>>()
        .join("\n");

    ASSESSMENT_PROMPT_TEMPLATE
        .replace("{role_title}", &role.title)
        .replace("{requirements}", &requirements)
        // resume last so text inside the resume is never treated as a placeholder
        .replace("{resume_text}", resume_text.trim())
}
