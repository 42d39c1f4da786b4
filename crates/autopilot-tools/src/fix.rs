//! Template-based fix generator.
//!
//! Classifies an issue by keyword and renders the matching template:
//! a contribution guide, a license file, or a fix note for anything else.

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use minijinja::{context, Environment};

use crate::collaborators::{FileChange, FixGenerator, FixProposal, IssueDetails, RepoContext};
use crate::error::ActionError;

const CONTRIBUTING_TEMPLATE: &str = r#"# Contributing to {{ repo }}

Thank you for your interest in contributing to {{ repo }}!

## Getting Started

1. Fork the repository
2. Create a feature branch from `{{ default_branch }}`
3. Make your changes with tests
4. Open a pull request describing the change

## Reporting Issues

Please include steps to reproduce, the expected behaviour and the actual
behaviour when opening an issue.

## Code Style
{% if languages %}
This project is primarily written in {{ languages | join(", ") }}. Follow the
conventions already used in the codebase.
{% else %}
Follow the conventions already used in the codebase.
{% endif %}
"#;

const LICENSE_TEMPLATE: &str = r#"MIT License

Copyright (c) {{ year }} {{ owner }}

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
"#;

const GENERIC_TEMPLATE: &str = r#"# Fix for #{{ number }}: {{ title }}

## Issue
{{ body if body else "No description provided." }}

## Resolution

This change addresses the issue reported in {{ url }}.
"#;

const PR_BODY_TEMPLATE: &str = r#"## Summary

Fixes #{{ number }}: {{ title }}

## Changes
{% for file in files %}
- `{{ file }}`
{%- endfor %}

Generated automatically from {{ url }}.
"#;

/// Kind of fix an issue calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixKind {
    Contributing,
    License,
    Generic,
}

impl FixKind {
    /// Classify an issue by its title and body.
    pub fn classify(issue: &IssueDetails) -> Self {
        let text = format!("{} {}", issue.title, issue.body).to_lowercase();
        if text.contains("contributing") {
            FixKind::Contributing
        } else if text.contains("license") || text.contains("licence") {
            FixKind::License
        } else {
            FixKind::Generic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FixKind::Contributing => "contributing",
            FixKind::License => "license",
            FixKind::Generic => "generic",
        }
    }
}

impl std::fmt::Display for FixKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fix generator backed by built-in minijinja templates.
pub struct TemplateFixGenerator {
    env: Environment<'static>,
}

impl TemplateFixGenerator {
    pub fn new() -> Result<Self, ActionError> {
        let mut env = Environment::new();
        env.add_template("contributing", CONTRIBUTING_TEMPLATE)?;
        env.add_template("license", LICENSE_TEMPLATE)?;
        env.add_template("generic", GENERIC_TEMPLATE)?;
        env.add_template("pr_body", PR_BODY_TEMPLATE)?;
        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String, ActionError> {
        let template = self.env.get_template(name)?;
        Ok(template.render(ctx)?)
    }

    fn file_for(
        &self,
        kind: FixKind,
        issue: &IssueDetails,
        repo: &RepoContext,
    ) -> Result<FileChange, ActionError> {
        let owner = repo.full_name.split('/').next().unwrap_or_default();
        let (path, content) = match kind {
            FixKind::Contributing => (
                "CONTRIBUTING.md".to_string(),
                self.render(
                    "contributing",
                    context! {
                        repo => &repo.full_name,
                        default_branch => &repo.default_branch,
                        languages => &repo.languages,
                    },
                )?,
            ),
            FixKind::License => (
                "LICENSE".to_string(),
                self.render("license", context! { year => Utc::now().year(), owner => owner })?,
            ),
            FixKind::Generic => (
                format!("docs/fixes/issue-{}.md", issue.number),
                self.render(
                    "generic",
                    context! {
                        number => issue.number,
                        title => &issue.title,
                        body => &issue.body,
                        url => &issue.url,
                    },
                )?,
            ),
        };

        Ok(FileChange {
            message: format!("Add {} for #{}", path, issue.number),
            path,
            content,
        })
    }
}

impl std::fmt::Debug for TemplateFixGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateFixGenerator").finish_non_exhaustive()
    }
}

#[async_trait]
impl FixGenerator for TemplateFixGenerator {
    async fn generate(
        &self,
        issue: &IssueDetails,
        repo: &RepoContext,
    ) -> Result<FixProposal, ActionError> {
        let kind = FixKind::classify(issue);
        tracing::debug!(issue = %issue.id, kind = %kind, "Generating fix");

        let file = self.file_for(kind, issue, repo)?;
        let body = self.render(
            "pr_body",
            context! {
                number => issue.number,
                title => &issue.title,
                url => &issue.url,
                files => vec![file.path.clone()],
            },
        )?;

        Ok(FixProposal {
            files: vec![file],
            title: format!("Fix #{}: {}", issue.number, issue.title),
            body,
            kind: kind.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(title: &str, body: &str) -> IssueDetails {
        IssueDetails {
            id: "acme/widgets#3".to_string(),
            title: title.to_string(),
            body: body.to_string(),
            repo: "acme/widgets".to_string(),
            number: 3,
            labels: vec![],
            url: "https://github.com/acme/widgets/issues/3".to_string(),
            simulated: true,
        }
    }

    fn repo() -> RepoContext {
        RepoContext {
            full_name: "acme/widgets".to_string(),
            description: None,
            default_branch: "main".to_string(),
            languages: vec!["Rust".to_string(), "Python".to_string()],
            topics: vec![],
            simulated: true,
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            FixKind::classify(&issue("Add CONTRIBUTING guide", "")),
            FixKind::Contributing
        );
        assert_eq!(
            FixKind::classify(&issue("Missing file", "we need a license")),
            FixKind::License
        );
        assert_eq!(FixKind::classify(&issue("Crash on start", "")), FixKind::Generic);
    }

    #[tokio::test]
    async fn test_generate_contributing() {
        let generator = TemplateFixGenerator::new().unwrap();
        let proposal = generator
            .generate(&issue("Add contributing guide", ""), &repo())
            .await
            .unwrap();

        assert_eq!(proposal.kind, "contributing");
        assert_eq!(proposal.files.len(), 1);
        assert_eq!(proposal.files[0].path, "CONTRIBUTING.md");
        assert!(proposal.files[0].content.contains("acme/widgets"));
        assert!(proposal.files[0].content.contains("Rust, Python"));
        assert!(proposal.body.contains("Fixes #3"));
    }

    #[tokio::test]
    async fn test_generate_license() {
        let generator = TemplateFixGenerator::new().unwrap();
        let proposal = generator
            .generate(&issue("No license", ""), &repo())
            .await
            .unwrap();

        assert_eq!(proposal.files[0].path, "LICENSE");
        assert!(proposal.files[0].content.contains("MIT License"));
        assert!(proposal.files[0].content.contains("acme"));
    }

    #[tokio::test]
    async fn test_generate_generic() {
        let generator = TemplateFixGenerator::new().unwrap();
        let proposal = generator
            .generate(&issue("Crash on start", "Stack trace here"), &repo())
            .await
            .unwrap();

        assert_eq!(proposal.kind, "generic");
        assert_eq!(proposal.files[0].path, "docs/fixes/issue-3.md");
        assert!(proposal.files[0].content.contains("Stack trace here"));
        assert!(proposal.body.contains("docs/fixes/issue-3.md"));
    }
}
