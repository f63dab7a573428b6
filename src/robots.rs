/// Parsed robots.txt rules for one origin.
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    groups: Vec<Group>,
    disallow_all: bool,
}

#[derive(Debug, Clone, Default)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
}

#[derive(Debug, Clone)]
struct Rule {
    allow: bool,
    pattern: String,
}

impl RobotsPolicy {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn disallow_all() -> Self {
        RobotsPolicy {
            groups: Vec::new(),
            disallow_all: true,
        }
    }

    /// Parse a robots.txt body. Unknown directives and malformed lines are ignored.
    pub fn parse(body: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut collecting_agents = false;

        for line in body.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match key.trim().to_ascii_lowercase().as_str() {
                "user-agent" => {
                    if !collecting_agents {
                        groups.push(Group::default());
                        collecting_agents = true;
                    }
                    if let Some(group) = groups.last_mut() {
                        group.agents.push(value.to_ascii_lowercase());
                    }
                }
                directive @ ("allow" | "disallow") => {
                    collecting_agents = false;
                    // Empty Disallow means "allow everything" and adds no rule.
                    if value.is_empty() {
                        continue;
                    }
                    if let Some(group) = groups.last_mut() {
                        group.rules.push(Rule {
                            allow: directive == "allow",
                            pattern: value.to_string(),
                        });
                    }
                }
                _ => collecting_agents = false,
            }
        }

        RobotsPolicy {
            groups,
            disallow_all: false,
        }
    }

    /// Whether `user_agent` may fetch `path` (path plus optional query).
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        if self.disallow_all {
            return false;
        }
        if path == "/robots.txt" {
            return true;
        }

        let token = product_token(user_agent);
        let mut rules: Vec<&Rule> = self
            .groups
            .iter()
            .filter(|g| g.agents.iter().any(|a| a != "*" && token.starts_with(a.as_str())))
            .flat_map(|g| &g.rules)
            .collect();
        if rules.is_empty() {
            rules = self
                .groups
                .iter()
                .filter(|g| g.agents.iter().any(|a| a == "*"))
                .flat_map(|g| &g.rules)
                .collect();
        }

        rules
            .into_iter()
            .filter(|r| pattern_matches(&r.pattern, path))
            .max_by(|a, b| {
                a.pattern
                    .len()
                    .cmp(&b.pattern.len())
                    .then(a.allow.cmp(&b.allow))
            })
            .map_or(true, |r| r.allow)
    }
}

/// `ExampleBot/1.0 (+https://…)` → `examplebot`.
fn product_token(user_agent: &str) -> String {
    user_agent
        .split(|c: char| c == '/' || c.is_whitespace())
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Prefix match with `*` wildcards and an optional trailing `$` anchor.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or("");
    if !path.starts_with(first) {
        return false;
    }
    let mut pos = first.len();
    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() {
        return !anchored || pos == path.len();
    }

    for (i, part) in rest.iter().enumerate() {
        if anchored && i == rest.len() - 1 {
            return path[pos..].ends_with(part);
        }
        match path[pos..].find(part) {
            Some(idx) => pos += idx + part.len(),
            None => return false,
        }
    }
    true
}

// ── Tests ──
