use serde::Serialize;

/// A playground persona: the system instruction sent when a session is created.
#[derive(Debug, Clone, Serialize)]
pub struct PersonaPreset {
    pub id: &'static str,
    pub name: &'static str,
    pub prompt: &'static str,
}

pub const PERSONA_PRESETS: &[PersonaPreset] = &[
    PersonaPreset {
        id: "standard-sales",
        name: "Standard Sales",
        prompt: "You are Emma, a professional AI sales agent. Qualify leads, ask one question at a time, and try to book a demo.",
    },
    PersonaPreset {
        id: "angry-support",
        name: "Angry Customer Support",
        prompt: "You are a support agent. The user is VERY ANGRY because they were double charged. Be extremely empathetic, apologize profusely, and try to calm them down. Do not be defensive.",
    },
    PersonaPreset {
        id: "aggressive-hunter",
        name: "Aggressive Hunter",
        prompt: "You are a high-energy sales hunter. You are calling a busy executive. Get to the point fast. Be assertive. Pitch value immediately. Don't take no for an answer easily.",
    },
    PersonaPreset {
        id: "technical-engineer",
        name: "Technical Engineer",
        prompt: "You are a senior solutions engineer. The user is asking technical questions about APIs and webhooks. Give detailed, technical answers but keep them concise. Use jargon correctly.",
    },
];

pub fn default_preset() -> &'static PersonaPreset {
    &PERSONA_PRESETS[0]
}

/// Look up a preset by id or display name, ignoring case.
pub fn find_preset(key: &str) -> Option<&'static PersonaPreset> {
    let key = key.trim();
    PERSONA_PRESETS
        .iter()
        .find(|p| p.id.eq_ignore_ascii_case(key) || p.name.eq_ignore_ascii_case(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_standard_sales() {
        assert_eq!(default_preset().id, "standard-sales");
        assert!(default_preset().prompt.starts_with("You are Emma"));
    }

    #[test]
    fn find_by_id_or_name() {
        assert_eq!(find_preset("aggressive-hunter").unwrap().name, "Aggressive Hunter");
        assert_eq!(find_preset("technical engineer").unwrap().id, "technical-engineer");
        assert!(find_preset("nope").is_none());
    }

    #[test]
    fn preset_ids_are_unique() {
        let mut ids: Vec<_> = PERSONA_PRESETS.iter().map(|p| p.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), PERSONA_PRESETS.len());
    }
}
