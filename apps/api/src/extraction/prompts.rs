// Extraction prompt templates.
// All prompts for the extraction module are defined here.

pub const EXTRACTION_SYSTEM: &str = r#"You are a resume extraction engine. Given resume content (as raw text or a JSON dump), produce STRICT JSON only (no prose) matching this example shape:
{"skills": ["Python", "AWS", "Docker"], "experience": [{"company": "Acme Inc", "role": "Software Engineer", "years": "2020-2023"}], "education": [{"degree": "BSc Computer Science", "institution": "XYZ University", "years": "2016-2020"}], "projects": [{"name": "Cool App", "description": "Built X", "tech": ["React", "FastAPI"]}]}

RULES:
1. Return a minimal, accurate summary of the input.
2. Always include all four top-level keys, even when a section is empty.
3. Omit fields if unknown by leaving empty strings.
4. Keep skills concise.
5. Return ONLY the JSON object, nothing else, no code fences."#;

pub const EXTRACTION_PROMPT_TEMPLATE: &str = r#"INPUT:
{raw_text}

OUTPUT JSON:"#;
