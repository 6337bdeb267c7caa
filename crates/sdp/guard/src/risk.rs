//! Static risk scanning.
//!
//! Scanners inspect artifact text before anything is pushed. Findings are
//! either *blocking* (the attempt aborts before push) or *advisory* (logged
//! and recorded as warnings). Scanning is pure and deterministic: the same
//! artifacts always produce the same findings in the same order.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use sdp_types::{Artifact, ArtifactKind, ArtifactSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RiskScanConfig;
use crate::error::{GuardError, Result};

// ── Findings ───────────────────────────────────────────────────────────

/// Whether a finding stops the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    Blocking,
    Advisory,
}

/// Built-in rules of [`PatternRiskScanner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskRule {
    QueryInLoop,
    MutationInLoop,
    HardcodedSecret,
    HardcodedRecordId,
    MissingNullGuard,
    SensitiveLogging,
}

impl RiskRule {
    pub fn severity(&self) -> FindingSeverity {
        match self {
            RiskRule::QueryInLoop | RiskRule::MutationInLoop | RiskRule::HardcodedSecret => {
                FindingSeverity::Blocking
            }
            RiskRule::HardcodedRecordId
            | RiskRule::MissingNullGuard
            | RiskRule::SensitiveLogging => FindingSeverity::Advisory,
        }
    }
}

impl fmt::Display for RiskRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskRule::QueryInLoop => "query-in-loop",
            RiskRule::MutationInLoop => "mutation-in-loop",
            RiskRule::HardcodedSecret => "hardcoded-secret",
            RiskRule::HardcodedRecordId => "hardcoded-record-id",
            RiskRule::MissingNullGuard => "missing-null-guard",
            RiskRule::SensitiveLogging => "sensitive-logging",
        };
        write!(f, "{}", name)
    }
}

/// One risk found in one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub artifact: String,
    /// 1-based line number.
    pub line: usize,
    /// Rule identifier, e.g. `query-in-loop`.
    pub rule: String,
    pub severity: FindingSeverity,
    pub message: String,
    pub excerpt: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} [{}] {}",
            self.artifact, self.line, self.rule, self.message
        )
    }
}

/// Result of scanning an artifact set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub findings: Vec<Finding>,
}

impl ScanReport {
    pub fn blocking(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == FindingSeverity::Blocking)
    }

    pub fn advisories(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == FindingSeverity::Advisory)
    }

    pub fn has_blocking(&self) -> bool {
        self.blocking().next().is_some()
    }

    pub fn merge(&mut self, other: ScanReport) {
        self.findings.extend(other.findings);
    }

    /// One line per blocking finding, for failure messages.
    pub fn blocking_summary(&self) -> String {
        self.blocking()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

// ── Scanner contract ───────────────────────────────────────────────────

/// A static analysis pass over artifacts.
///
/// Implementations must be deterministic. New rules are added by writing a
/// new scanner and combining it with [`CompositeRiskScanner`]; the pipeline
/// only sees this trait.
pub trait RiskScanner: Send + Sync {
    fn name(&self) -> &str;

    fn scan(&self, artifacts: &ArtifactSet) -> ScanReport;
}

/// Runs several scanners in order and concatenates their findings.
#[derive(Clone, Default)]
pub struct CompositeRiskScanner {
    scanners: Vec<Arc<dyn RiskScanner>>,
}

impl CompositeRiskScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, scanner: Arc<dyn RiskScanner>) -> Self {
        self.scanners.push(scanner);
        self
    }
}

impl RiskScanner for CompositeRiskScanner {
    fn name(&self) -> &str {
        "composite"
    }

    fn scan(&self, artifacts: &ArtifactSet) -> ScanReport {
        let mut report = ScanReport::default();
        for scanner in &self.scanners {
            report.merge(scanner.scan(artifacts));
        }
        report
    }
}

// ── Pattern scanner ────────────────────────────────────────────────────

/// Line-oriented pattern checks for Apex-style source.
///
/// Loop scope is tracked by brace depth. A query inside a `for (...)`
/// header is the safe bulk-iteration form and is not flagged unless the
/// header itself sits inside another loop.
pub struct PatternRiskScanner {
    config: RiskScanConfig,
    loop_header: Regex,
    query: Regex,
    mutation: Regex,
    secrets: Vec<Regex>,
    record_id: Regex,
    single_row_query: Regex,
    map_get_deref: Regex,
    debug_call: Regex,
}

impl PatternRiskScanner {
    pub fn new(config: RiskScanConfig) -> Result<Self> {
        let mut secret_patterns: Vec<String> = vec![
            r#"(?i)\b(password|passwd|pwd|secret|api_?key|client_?secret|access_?token|auth_?token)\b\s*[:=]\s*['"][^'"]{4,}['"]"#.into(),
            r"(?i)\bbearer\s+[a-z0-9\-_.=]{20,}".into(),
            r"-----BEGIN (RSA |EC |OPENSSH )?PRIVATE KEY-----".into(),
            r"\bAKIA[0-9A-Z]{16}\b".into(),
            r"\b(sk|rk)_live_[0-9a-zA-Z]{16,}\b".into(),
        ];
        secret_patterns.extend(config.extra_secret_patterns.iter().cloned());

        let secrets = secret_patterns
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            loop_header: compile(r"^\s*(for|while)\s*\(|^\s*do\b")?,
            query: compile(r"(?i)\[\s*(select|find)\b|\bdatabase\.query(withbinds)?\s*\(")?,
            mutation: compile(
                r"(?i)(^|[;{}])\s*(insert|update|upsert|delete|undelete|merge)\s+[a-z_\[(]|\bdatabase\.(insert|update|upsert|delete|undelete|merge)\s*\(",
            )?,
            secrets,
            record_id: compile(r#"['"](0[0-9A-Za-z]{14}(?:[0-9A-Za-z]{3})?)['"]"#)?,
            single_row_query: compile(r"^\s*([A-Za-z_]\w*)\s+\w+\s*=\s*\[\s*(?i:select)\b")?,
            map_get_deref: compile(r"\.get\([^()]*\)\.\w+")?,
            debug_call: compile(r"(?i)\bsystem\.debug\s*\(")?,
            config,
        })
    }

    fn enabled(&self, rule: RiskRule) -> bool {
        !self.config.disabled_rules.contains(&rule)
    }

    fn scan_artifact(&self, artifact: &Artifact, findings: &mut Vec<Finding>) {
        let mut depth: usize = 0;
        let mut loop_depths: Vec<usize> = Vec::new();
        let mut pending_loop = false;
        // Open parentheses of a loop header that continues on later lines.
        let mut header_parens: usize = 0;
        let mut in_block_comment = false;

        for (index, raw) in artifact.content.lines().enumerate() {
            let line_no = index + 1;
            let code = strip_comments(raw, &mut in_block_comment);
            if code.trim().is_empty() {
                continue;
            }

            self.check_secrets(artifact, line_no, raw, &code, findings);

            if artifact.kind != ArtifactKind::Source {
                continue;
            }

            let inside_loop = !loop_depths.is_empty();
            let mut body_segment: Option<&str> = None;

            let continues_header = header_parens > 0;
            if continues_header {
                // Still inside the header; a query here is the bulk form.
                if let Some(rest) = close_parens(&code, &mut header_parens) {
                    let (segment, pending) = loop_rest(rest);
                    body_segment = segment;
                    pending_loop = pending;
                }
            } else if pending_loop && !code.trim_start().starts_with('{') {
                // Brace-less loop body on the line after the header.
                body_segment = Some(code.as_str());
                pending_loop = false;
            }

            if !continues_header && self.loop_header.is_match(&code) {
                pending_loop = true;
                if let Some(rest) = after_header(&code, &mut header_parens) {
                    let (segment, pending) = loop_rest(rest);
                    if segment.is_some() {
                        body_segment = segment;
                    }
                    pending_loop = pending;
                }
            }

            if inside_loop {
                self.check_loop_body(artifact, line_no, raw, &code, findings);
            } else if let Some(segment) = body_segment {
                self.check_loop_body(artifact, line_no, raw, segment, findings);
            }

            self.check_advisories(artifact, line_no, raw, &code, findings);

            for ch in code.chars() {
                match ch {
                    '{' => {
                        depth += 1;
                        if pending_loop {
                            loop_depths.push(depth);
                            pending_loop = false;
                        }
                    }
                    '}' => {
                        if loop_depths.last() == Some(&depth) {
                            loop_depths.pop();
                        }
                        depth = depth.saturating_sub(1);
                    }
                    _ => {}
                }
            }
        }
    }

    fn check_loop_body(
        &self,
        artifact: &Artifact,
        line: usize,
        raw: &str,
        code: &str,
        findings: &mut Vec<Finding>,
    ) {
        if self.enabled(RiskRule::QueryInLoop) && self.query.is_match(code) {
            findings.push(finding(
                artifact,
                line,
                raw,
                RiskRule::QueryInLoop,
                "query inside a loop; bulk-query before the loop instead",
            ));
        }
        if self.enabled(RiskRule::MutationInLoop) && self.mutation.is_match(code) {
            findings.push(finding(
                artifact,
                line,
                raw,
                RiskRule::MutationInLoop,
                "data mutation inside a loop; collect records and mutate once",
            ));
        }
    }

    fn check_secrets(
        &self,
        artifact: &Artifact,
        line: usize,
        raw: &str,
        code: &str,
        findings: &mut Vec<Finding>,
    ) {
        if self.enabled(RiskRule::HardcodedSecret) && self.secrets.iter().any(|r| r.is_match(code))
        {
            findings.push(finding(
                artifact,
                line,
                raw,
                RiskRule::HardcodedSecret,
                "credential-like literal in source; move it to protected configuration",
            ));
        }
        if self.enabled(RiskRule::HardcodedRecordId) {
            let hit = self.record_id.captures_iter(code).any(|c| {
                c.get(1)
                    .map(|m| m.as_str().chars().any(|ch| ch.is_ascii_alphabetic()))
                    .unwrap_or(false)
            });
            if hit {
                findings.push(finding(
                    artifact,
                    line,
                    raw,
                    RiskRule::HardcodedRecordId,
                    "hardcoded record id; ids differ between environments",
                ));
            }
        }
    }

    fn check_advisories(
        &self,
        artifact: &Artifact,
        line: usize,
        raw: &str,
        code: &str,
        findings: &mut Vec<Finding>,
    ) {
        if self.enabled(RiskRule::MissingNullGuard) {
            let single_row = self
                .single_row_query
                .captures(code)
                .and_then(|c| c.get(1))
                .map(|t| {
                    let ty = t.as_str().to_ascii_lowercase();
                    !matches!(ty.as_str(), "list" | "set" | "map" | "integer" | "return")
                })
                .unwrap_or(false);
            if single_row || self.map_get_deref.is_match(code) {
                findings.push(finding(
                    artifact,
                    line,
                    raw,
                    RiskRule::MissingNullGuard,
                    "value dereferenced without a null or empty-result guard",
                ));
            }
        }
        if self.enabled(RiskRule::SensitiveLogging) {
            if let Some(m) = self.debug_call.find(code) {
                let args = code[m.end()..].to_ascii_lowercase();
                if self
                    .config
                    .sensitive_terms
                    .iter()
                    .any(|t| args.contains(&t.to_ascii_lowercase()))
                {
                    findings.push(finding(
                        artifact,
                        line,
                        raw,
                        RiskRule::SensitiveLogging,
                        "debug output may expose sensitive data",
                    ));
                }
            }
        }
    }
}

impl RiskScanner for PatternRiskScanner {
    fn name(&self) -> &str {
        "pattern"
    }

    fn scan(&self, artifacts: &ArtifactSet) -> ScanReport {
        let mut findings = Vec::new();
        for artifact in artifacts.iter() {
            self.scan_artifact(artifact, &mut findings);
        }
        debug!(
            artifacts = artifacts.len(),
            findings = findings.len(),
            "Risk scan complete"
        );
        ScanReport { findings }
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| GuardError::InvalidConfig(format!("bad pattern '{}': {}", pattern, e)))
}

fn finding(artifact: &Artifact, line: usize, raw: &str, rule: RiskRule, message: &str) -> Finding {
    let mut excerpt = raw.trim().to_string();
    if excerpt.len() > 120 {
        let mut cut = 120;
        while !excerpt.is_char_boundary(cut) {
            cut -= 1;
        }
        excerpt.truncate(cut);
    }
    Finding {
        artifact: artifact.name.clone(),
        line,
        rule: rule.to_string(),
        severity: rule.severity(),
        message: message.to_string(),
        excerpt,
    }
}

/// Remove `//` and `/* */` comments, carrying block state across lines.
/// Comment markers inside `'...'` or `"..."` literals are kept.
fn strip_comments(line: &str, in_block: &mut bool) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    while let Some(ch) = chars.next() {
        if *in_block {
            if ch == '*' && chars.peek() == Some(&'/') {
                chars.next();
                *in_block = false;
            }
            continue;
        }
        if let Some(q) = quote {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => {
                quote = Some(ch);
                out.push(ch);
            }
            '/' if chars.peek() == Some(&'/') => return out,
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                *in_block = true;
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Text after a loop header's balanced parentheses, or `None` when the
/// header does not close on this line; `depth` then holds the parentheses
/// still open. For `do` the text after the keyword.
fn after_header<'a>(code: &'a str, depth: &mut usize) -> Option<&'a str> {
    let trimmed = code.trim_start();
    if let Some(rest) = trimmed.strip_prefix("do") {
        return Some(rest);
    }
    let open = code.find('(')?;
    *depth = 0;
    close_parens(&code[open..], depth)
}

/// Track parentheses from `depth` and return the text after the one that
/// brings it back to zero.
fn close_parens<'a>(code: &'a str, depth: &mut usize) -> Option<&'a str> {
    for (offset, ch) in code.char_indices() {
        match ch {
            '(' => *depth += 1,
            ')' => {
                *depth = depth.saturating_sub(1);
                if *depth == 0 {
                    return Some(&code[offset + 1..]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split what follows a closed loop header into an inline body segment and
/// whether the body is still to come.
fn loop_rest(rest: &str) -> (Option<&str>, bool) {
    let rest = rest.trim_start();
    let body = rest.strip_prefix('{').unwrap_or(rest);
    let segment = (!body.trim().is_empty() && !rest.starts_with(';')).then_some(body);
    (segment, rest.starts_with('{') || rest.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> PatternRiskScanner {
        PatternRiskScanner::new(RiskScanConfig::default()).unwrap()
    }

    fn scan_source(code: &str) -> ScanReport {
        scanner().scan(&ArtifactSet::new().with(Artifact::source("Svc.cls", code)))
    }

    fn rules(report: &ScanReport) -> Vec<&str> {
        report.findings.iter().map(|f| f.rule.as_str()).collect()
    }

    #[test]
    fn query_inside_loop_is_blocking() {
        let report = scan_source(
            "public void run(List<Id> ids) {\n\
             \x20   for (Id i : ids) {\n\
             \x20       Account a = [SELECT Id FROM Account WHERE Id = :i];\n\
             \x20   }\n\
             }",
        );
        assert!(report.has_blocking());
        let f = report.blocking().next().unwrap();
        assert_eq!(f.rule, "query-in-loop");
        assert_eq!(f.line, 3);
    }

    #[test]
    fn query_in_for_header_is_safe() {
        let report = scan_source(
            "for (Account a : [SELECT Id, Name FROM Account LIMIT 200]) {\n\
             \x20   names.add(a.Name);\n\
             }",
        );
        assert!(!report.has_blocking(), "{:?}", report.findings);
    }

    #[test]
    fn mutation_inside_while_loop_is_blocking() {
        let report = scan_source(
            "while (it.hasNext()) {\n\
             \x20   Contact c = it.next();\n\
             \x20   update c;\n\
             }",
        );
        assert_eq!(rules(&report), vec!["mutation-in-loop"]);
    }

    #[test]
    fn braceless_loop_body_is_checked() {
        let same_line = scan_source("for (Contact c : contacts) insert c;");
        assert_eq!(rules(&same_line), vec!["mutation-in-loop"]);

        let next_line = scan_source("for (Contact c : contacts)\n    Database.insert(c);\nupdate all;");
        assert_eq!(rules(&next_line), vec!["mutation-in-loop"]);
        assert_eq!(next_line.findings[0].line, 2);
    }

    #[test]
    fn mutation_after_loop_closes_is_fine() {
        let report = scan_source(
            "for (Contact c : contacts) {\n\
             \x20   c.Status__c = 'Done';\n\
             }\n\
             update contacts;",
        );
        assert!(report.findings.is_empty(), "{:?}", report.findings);
    }

    #[test]
    fn nested_loops_track_depth() {
        let report = scan_source(
            "for (Integer i = 0; i < 3; i++) {\n\
             \x20   if (i > 0) {\n\
             \x20       log(i);\n\
             \x20   }\n\
             \x20   delete rows;\n\
             }\n\
             delete leftovers;",
        );
        assert_eq!(rules(&report), vec!["mutation-in-loop"]);
        assert_eq!(report.findings[0].line, 5);
    }

    #[test]
    fn commented_code_is_ignored() {
        let report = scan_source(
            "for (Id i : ids) {\n\
             \x20   // insert records;\n\
             \x20   /* [SELECT Id FROM Account]\n\
             \x20      update x; */\n\
             }",
        );
        assert!(report.findings.is_empty(), "{:?}", report.findings);
    }

    #[test]
    fn comment_markers_inside_literals_do_not_hide_code() {
        let report =
            scan_source("String u = 'https://api.x.com'; String password = 'hunter2secret';");
        assert_eq!(rules(&report), vec!["hardcoded-secret"]);

        let report = scan_source(
            "for (Account a : accounts) {\n\
             \x20   a.Website = 'https://x.com'; update a;\n\
             }",
        );
        assert_eq!(rules(&report), vec!["mutation-in-loop"]);
        assert_eq!(report.findings[0].line, 2);
    }

    #[test]
    fn escaped_quotes_keep_the_literal_open() {
        let report = scan_source(
            "String s = 'it\\'s // still text'; String password = 'hunter2secret';",
        );
        assert!(report.has_blocking(), "{:?}", report.findings);
    }

    #[test]
    fn trailing_comment_after_literal_is_stripped() {
        let report = scan_source("String s = 'ok'; // password = 'hunter2secret'");
        assert!(report.findings.is_empty(), "{:?}", report.findings);
    }

    #[test]
    fn query_in_multi_line_for_header_is_safe() {
        let report = scan_source(
            "for (Account a :\n\
             \x20       [SELECT Id FROM Account WHERE Id IN (SELECT AccountId FROM Contact)]) {\n\
             \x20   names.add(a.Name);\n\
             }",
        );
        assert!(report.findings.is_empty(), "{:?}", report.findings);
    }

    #[test]
    fn body_after_multi_line_header_is_still_checked() {
        let report = scan_source(
            "for (Account a :\n\
             \x20       [SELECT Id FROM Account]) {\n\
             \x20   update a;\n\
             }\n\
             update accounts;",
        );
        assert_eq!(rules(&report), vec!["mutation-in-loop"]);
        assert_eq!(report.findings[0].line, 3);
    }

    #[test]
    fn hardcoded_secret_is_blocking_in_any_artifact() {
        let set = ArtifactSet::new()
            .with(Artifact::source("Api.cls", "String apiKey = 'abcd1234efgh';"))
            .with(Artifact::metadata(
                "Named.xml",
                "<password>\"hunter22\"</password>\nclientSecret: \"s3cr3t-value\"",
            ));
        let report = scanner().scan(&set);
        let blocking: Vec<_> = report.blocking().map(|f| f.artifact.as_str()).collect();
        assert_eq!(blocking, vec!["Api.cls", "Named.xml"]);
    }

    #[test]
    fn advisories_do_not_block() {
        let report = scan_source(
            "Account acc = [SELECT Id FROM Account WHERE Name = 'Acme'];\n\
             Id owner = '005000000000ABC';\n\
             System.debug('user password: ' + pwdField);\n\
             String city = byId.get(key).BillingCity;",
        );
        assert!(!report.has_blocking());
        assert_eq!(
            rules(&report),
            vec![
                "missing-null-guard",
                "hardcoded-record-id",
                "sensitive-logging",
                "missing-null-guard"
            ]
        );
    }

    #[test]
    fn list_assignment_is_not_a_null_risk() {
        let report = scan_source("List<Account> rows = [SELECT Id FROM Account];");
        assert!(report.findings.is_empty(), "{:?}", report.findings);
    }

    #[test]
    fn disabled_rules_are_skipped() {
        let config = RiskScanConfig {
            disabled_rules: vec![RiskRule::MutationInLoop],
            ..Default::default()
        };
        let scanner = PatternRiskScanner::new(config).unwrap();
        let report = scanner.scan(
            &ArtifactSet::new().with(Artifact::source("A.cls", "for (X x : xs) { update x; }")),
        );
        assert!(report.findings.is_empty());
    }

    #[test]
    fn invalid_extra_pattern_is_config_error() {
        let config = RiskScanConfig {
            extra_secret_patterns: vec!["(unclosed".into()],
            ..Default::default()
        };
        assert!(matches!(
            PatternRiskScanner::new(config),
            Err(GuardError::InvalidConfig(_))
        ));
    }

    #[test]
    fn scanning_is_deterministic() {
        let code = "for (A a : as) {\n  insert a;\n  Account b = [SELECT Id FROM Account];\n}";
        let first = scan_source(code);
        let second = scan_source(code);
        assert_eq!(first, second);
    }

    #[test]
    fn composite_concatenates() {
        struct AlwaysWarn;
        impl RiskScanner for AlwaysWarn {
            fn name(&self) -> &str {
                "always-warn"
            }
            fn scan(&self, _: &ArtifactSet) -> ScanReport {
                ScanReport {
                    findings: vec![Finding {
                        artifact: "*".into(),
                        line: 0,
                        rule: "custom".into(),
                        severity: FindingSeverity::Advisory,
                        message: "custom rule".into(),
                        excerpt: String::new(),
                    }],
                }
            }
        }

        let composite = CompositeRiskScanner::new()
            .with(Arc::new(scanner()))
            .with(Arc::new(AlwaysWarn));
        let report = composite.scan(
            &ArtifactSet::new().with(Artifact::source("A.cls", "for (X x : xs) { update x; }")),
        );
        assert_eq!(rules(&report), vec!["mutation-in-loop", "custom"]);
    }
}
