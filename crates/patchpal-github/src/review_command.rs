use regex::Regex;

/// Instruction keyword selecting the built-in default review task.
pub const DEFAULT_INSTRUCTION_KEYWORD: &str = "default";

#[derive(Debug, Clone)]
/// Matches `/<verb> <instruction>` command lines inside comment bodies.
pub struct ReviewCommandMatcher {
    verb: String,
    pattern: Regex,
}

impl ReviewCommandMatcher {
    pub fn new(verb: &str) -> Result<Self, regex::Error> {
        let verb = verb.trim().trim_start_matches('/');
        let pattern = Regex::new(&format!(r"(?m)^/{}\s+(.+)$", regex::escape(verb)))?;
        Ok(Self {
            verb: verb.to_string(),
            pattern,
        })
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// Return the instruction captured by the first command line, if any.
    pub fn instruction<'a>(&self, body: &'a str) -> Option<&'a str> {
        let captures = self.pattern.captures(body)?;
        let instruction = captures.get(1)?.as_str().trim();
        if instruction.is_empty() {
            None
        } else {
            Some(instruction)
        }
    }

    pub fn usage(&self) -> String {
        format!("/{} <instruction|{DEFAULT_INSTRUCTION_KEYWORD}>", self.verb)
    }
}

/// Return true when `instruction` selects the built-in default task.
pub fn is_default_instruction(instruction: &str) -> bool {
    instruction
        .trim()
        .eq_ignore_ascii_case(DEFAULT_INSTRUCTION_KEYWORD)
}
