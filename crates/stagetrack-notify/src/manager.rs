//! Notification manager implementation using minijinja.

use crate::{
    engine::NotificationRenderer,
    error::{NotifyError, Result},
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const TEMPLATE_EXT: &str = "j2";

const BUILTIN_TEMPLATES: [(&str, &str); 4] = [
    ("stage_updated", include_str!("../templates/stage_updated.j2")),
    (
        "stage_auto_advanced",
        include_str!("../templates/stage_auto_advanced.j2"),
    ),
    (
        "transition_rejected",
        include_str!("../templates/transition_rejected.j2"),
    ),
    ("approval_required", include_str!("../templates/approval_required.j2")),
];

/// Manager for notification templates.
///
/// Starts with one built-in template per event kind. Files named
/// `<name>.j2` in an override directory replace the built-in of the same
/// name or add new templates.
///
/// # Examples
///
/// ```
/// use stagetrack_core::StageEvent;
/// use stagetrack_notify::{NotificationManager, NotificationRenderer};
///
/// let manager = NotificationManager::new()?;
/// let message = manager.render_event(&StageEvent::ApprovalRequired {
///     project_id: "p-1".into(),
///     stage_id: "concept".into(),
/// })?;
/// assert_eq!(message, "[p-1] concept is awaiting external approval");
/// # Ok::<(), stagetrack_notify::NotifyError>(())
/// ```
#[derive(Debug)]
pub struct NotificationManager {
    /// Override directory, if one was loaded.
    pub templates_dir: Option<PathBuf>,
    env: minijinja::Environment<'static>,
    names: BTreeSet<String>,
}

impl NotificationManager {
    /// Creates a manager holding only the built-in templates.
    ///
    /// # Errors
    ///
    /// Only fails if a built-in template does not compile.
    pub fn new() -> Result<Self> {
        let mut manager = Self {
            templates_dir: None,
            env: minijinja::Environment::new(),
            names: BTreeSet::new(),
        };
        for (name, source) in BUILTIN_TEMPLATES {
            manager.add_template(name, source.to_string())?;
        }
        Ok(manager)
    }

    /// Creates a manager with the built-ins plus every `.j2` file in
    /// `templates_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory does not exist, cannot be read, or
    /// holds a template that does not compile.
    pub fn with_overrides(templates_dir: PathBuf) -> Result<Self> {
        if !templates_dir.is_dir() {
            return Err(NotifyError::TemplateDirectoryNotFound(templates_dir));
        }

        let mut manager = Self::new()?;
        for (name, path) in scan_templates(&templates_dir)? {
            let source = std::fs::read_to_string(&path)
                .map_err(|source| NotifyError::TemplateLoadError { path, source })?;
            tracing::debug!(template = %name, "loaded template override");
            manager.add_template(&name, source)?;
        }
        manager.templates_dir = Some(templates_dir);
        Ok(manager)
    }

    /// Loads overrides from `templates_dir` if it exists, else the built-ins.
    ///
    /// # Errors
    ///
    /// See [`NotificationManager::with_overrides`].
    pub fn discover(templates_dir: &Path) -> Result<Self> {
        if templates_dir.is_dir() {
            Self::with_overrides(templates_dir.to_path_buf())
        } else {
            Self::new()
        }
    }

    /// Adds or replaces a template.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::TemplateSyntaxError` if the source does not compile.
    pub fn add_template(&mut self, name: &str, source: String) -> Result<()> {
        self.env
            .add_template_owned(name.to_string(), source)
            .map_err(|e| NotifyError::TemplateSyntaxError {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        self.names.insert(name.to_string());
        Ok(())
    }
}

impl NotificationRenderer for NotificationManager {
    fn render<T: Serialize>(&self, template: &str, ctx: &T) -> Result<String> {
        let tmpl = self
            .env
            .get_template(template)
            .map_err(|e| NotifyError::TemplateNotFound(format!("{template}: {e}")))?;
        tmpl.render(ctx)
            .map_err(|e| NotifyError::TemplateRenderError(format!("{template}: {e}")))
    }

    fn list_templates(&self) -> Result<Vec<String>> {
        Ok(self.names.iter().cloned().collect())
    }
}

fn scan_templates(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = std::fs::read_dir(dir).map_err(|source| NotifyError::TemplateListError {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut templates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| NotifyError::TemplateListError {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();

        if path.is_file()
            && let Some(ext) = path.extension()
            && ext == TEMPLATE_EXT
            && let Some(name) = path.file_stem()
            && let Some(name_str) = name.to_str()
        {
            templates.push((name_str.to_string(), path.clone()));
        }
    }

    templates.sort();
    Ok(templates)
}
