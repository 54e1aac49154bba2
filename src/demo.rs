//! Built-in demo documents used when the file listing server is unavailable.

use crate::registry::{ContextFile, FileKind};
use chrono::Utc;

/// A provider of fallback context files.
///
/// The registry consults its fallback source whenever a sync fails, so the
/// demo set is ordinary default data, not special-cased logic.
pub trait FallbackSource: Send + Sync {
    /// Produce the fallback file set with fresh timestamps.
    fn files(&self) -> Vec<ContextFile>;
}

/// The fixed three-document demo set.
pub struct DemoFiles;

impl FallbackSource for DemoFiles {
    fn files(&self) -> Vec<ContextFile> {
        let now = Utc::now();
        vec![
            ContextFile {
                id: "1".to_owned(),
                name: "project-overview.md".to_owned(),
                path: "/app/context/project-overview.md".to_owned(),
                size: 2048,
                kind: FileKind::Markdown,
                content: Some(PROJECT_OVERVIEW.to_owned()),
                last_modified: now,
                is_loading: false,
                is_selected: true,
            },
            ContextFile {
                id: "2".to_owned(),
                name: "api-documentation.json".to_owned(),
                path: "/app/context/api-documentation.json".to_owned(),
                size: 4096,
                kind: FileKind::Json,
                content: Some(API_DOCUMENTATION.to_owned()),
                last_modified: now,
                is_loading: false,
                is_selected: false,
            },
            ContextFile {
                id: "3".to_owned(),
                name: "user-guide.txt".to_owned(),
                path: "/app/context/user-guide.txt".to_owned(),
                size: 1536,
                kind: FileKind::Text,
                content: Some(USER_GUIDE.to_owned()),
                last_modified: now,
                is_loading: false,
                is_selected: false,
            },
        ]
    }
}

const PROJECT_OVERVIEW: &str = r"# Project Overview

## Introduction
This is a comprehensive AI-powered document analysis system designed to help users extract insights from their documents.

## Key Features
- Real-time document processing
- Context-aware responses
- Multi-language support
- Secure file handling

## Architecture
The system uses a modern microservices architecture with:
- Frontend: React with TypeScript
- AI Engine: Ollama with LLaMA 3
- Backend: Edge Functions for API routing";

const API_DOCUMENTATION: &str = r#"{
  "api_version": "2.0",
  "endpoints": [
    {
      "path": "/api/analyze",
      "method": "POST",
      "description": "Analyze document content"
    },
    {
      "path": "/api/contexts",
      "method": "GET",
      "description": "List available contexts"
    }
  ],
  "rate_limits": {
    "requests_per_minute": 60,
    "max_file_size_mb": 10
  }
}"#;

const USER_GUIDE: &str = r"User Guide - AI Context Engine

Getting Started:
1. Upload your documents or sync from server
2. Select the context files you want to analyze
3. Ask questions in natural language
4. Review AI responses with highlighted references

Tips for Best Results:
- Be specific in your questions
- Reference document sections by name
- Use follow-up questions for deeper analysis

Supported File Types:
- Markdown (.md)
- JSON (.json)
- Plain Text (.txt)
- PDF (coming soon)";
