//! Read provider configuration from RON text or files.

use std::{fs, path::Path};

use ron::{Options, extensions::Extensions};
use tracing::debug;

use crate::{
    ProviderConfig,
    error::{Error, excerpt_at},
};

/// Parse a provider config from RON text and validate it.
pub fn load_from_str(source: &str) -> Result<ProviderConfig, Error> {
    let options = Options::default().with_default_extension(Extensions::IMPLICIT_SOME);
    let config: ProviderConfig = options.from_str(source).map_err(|e| {
        let (line, col) = (e.span.start.line, e.span.start.col);
        Error::Parse {
            path: None,
            line,
            col,
            message: e.code.to_string(),
            excerpt: excerpt_at(source, line, col),
        }
    })?;
    config.defaults.validate()?;
    Ok(config)
}

/// Load a provider config from a `.ron` file at `path`.
pub fn load_from_path(path: &Path) -> Result<ProviderConfig, Error> {
    let source = fs::read_to_string(path).map_err(|e| Error::Read {
        path: Some(path.to_path_buf()),
        message: e.to_string(),
    })?;
    let config = load_from_str(&source).map_err(|e| e.with_path(path))?;
    debug!(path = %path.display(), environment = ?config.environment, "loaded provider config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::{env, process};

    use popup_geom::parse_placement;

    use super::*;
    use crate::{BlurBehavior, Dimension, EnvironmentPreference, PopupDefaults};

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = load_from_str("()").unwrap();
        assert_eq!(cfg, ProviderConfig::default());
    }

    #[test]
    fn partial_overrides_keep_other_defaults() {
        let cfg = load_from_str(
            r#"(
                environment: overlay,
                defaults: (
                    width: auto,
                    height: px(180.0),
                    max_height: 400.0,
                    placement: "right-end",
                    blur_behavior: none,
                    close_on_escape: false,
                ),
            )"#,
        )
        .unwrap();
        assert_eq!(cfg.environment, EnvironmentPreference::Overlay);
        let d = &cfg.defaults;
        assert_eq!(d.width, Dimension::Auto);
        assert_eq!(d.height, Dimension::Px(180.0));
        assert_eq!(d.max_height, Some(400.0));
        assert_eq!(d.placement, parse_placement("right-end").unwrap());
        assert_eq!(d.blur_behavior, BlurBehavior::None);
        assert!(!d.close_on_escape);
        assert_eq!(d.offset, PopupDefaults::default().offset);
        assert!(d.restore_focus);
    }

    #[test]
    fn parse_errors_carry_location() {
        let err =
            load_from_str("(\n  defaults: (\n    placement: \"sideways\",\n  ),\n)").unwrap_err();
        match err {
            Error::Parse { line, excerpt, .. } => {
                assert_eq!(line, 3);
                assert!(excerpt.contains("sideways"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn validation_runs_after_parse() {
        let err = load_from_str("(defaults: (offset: -2.0))").unwrap_err();
        assert!(matches!(err, Error::Validation { field: "offset", .. }));
    }

    #[test]
    fn file_loading_attaches_path() {
        let dir = env::temp_dir();
        let good = dir.join(format!("popup-config-{}-good.ron", process::id()));
        fs::write(&good, "(environment: container)").unwrap();
        let cfg = load_from_path(&good).unwrap();
        assert_eq!(cfg.environment, EnvironmentPreference::Container);

        let bad = dir.join(format!("popup-config-{}-bad.ron", process::id()));
        fs::write(&bad, "(environment: everywhere)").unwrap();
        let err = load_from_path(&bad).unwrap_err();
        assert_eq!(err.path(), Some(bad.as_path()));
        fs::remove_file(&good).ok();
        fs::remove_file(&bad).ok();

        let missing = dir.join("popup-config-does-not-exist.ron");
        assert!(matches!(load_from_path(&missing), Err(Error::Read { .. })));
    }
}
