use std::{
    env,
    iter::Peekable,
    path::{Path, PathBuf},
    str::Chars,
};

use crate::error::{PathError, PathResult};

/// Resolves a path string that may contain environment variables.
///
/// `$VAR` and `${VAR}` are expanded from the environment, a leading `~` becomes the user's
/// home directory, and relative paths are anchored at the current working directory.
///
/// # Errors
///
/// * [`PathError::Empty`] if the path is empty
/// * [`PathError::CurrentDir`] if the current directory cannot be determined
/// * [`PathError::MissingEnvVar`] if a referenced variable is undefined
/// * [`PathError::UnclosedVariable`] if a `${` is never closed
///
/// # Example
///
/// ```
/// use bazaar_utils::path::resolve_path;
///
/// let resolved = resolve_path("/var/lib/bazaar").unwrap();
/// assert!(resolved.is_absolute());
/// ```
pub fn resolve_path(path: &str) -> PathResult<PathBuf> {
    let path = path.trim();

    if path.is_empty() {
        return Err(PathError::Empty);
    }

    let path_buf = PathBuf::from(expand_variables(path)?);

    if path_buf.is_absolute() {
        Ok(path_buf)
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(path_buf))
            .map_err(|err| PathError::CurrentDir { source: err })
    }
}

/// Returns the user's home directory.
///
/// Reads `HOME`; when it is unset the system temporary directory is used so that default
/// paths still resolve to something writable.
pub fn home_dir() -> PathBuf {
    env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir())
}

/// `$XDG_CONFIG_HOME`, defaulting to `$HOME/.config`.
pub fn xdg_config_home() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", ".config")
}

/// `$XDG_DATA_HOME`, defaulting to `$HOME/.local/share`.
pub fn xdg_data_home() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", ".local/share")
}

/// `$XDG_CACHE_HOME`, defaulting to `$HOME/.cache`.
pub fn xdg_cache_home() -> PathBuf {
    xdg_dir("XDG_CACHE_HOME", ".cache")
}

fn xdg_dir(var: &str, fallback: &str) -> PathBuf {
    env::var(var)
        .ok()
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir().join(fallback))
}

/// Returns true if `candidate` is `base` itself or lies underneath it.
///
/// Both paths are compared component-wise without touching the filesystem, so callers
/// must pass paths that are already free of `..` components.
pub fn is_within<P: AsRef<Path>, B: AsRef<Path>>(candidate: P, base: B) -> bool {
    candidate.as_ref().starts_with(base.as_ref())
}

fn expand_variables(path: &str) -> PathResult<String> {
    let mut result = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '$' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    let var_name = consume_until(&mut chars, '}')?;
                    expand_env_var(&var_name, &mut result, path)?;
                } else {
                    let var_name = consume_var_name(&mut chars);
                    if var_name.is_empty() {
                        result.push('$');
                    } else {
                        expand_env_var(&var_name, &mut result, path)?;
                    }
                }
            }
            '~' if result.is_empty() => result.push_str(&home_dir().to_string_lossy()),
            _ => result.push(c),
        }
    }

    Ok(result)
}

fn consume_until(chars: &mut Peekable<Chars>, delimiter: char) -> PathResult<String> {
    let mut var_name = String::new();

    for c in chars.by_ref() {
        if c == delimiter {
            return Ok(var_name);
        }
        var_name.push(c);
    }

    Err(PathError::UnclosedVariable {
        input: format!("${{{var_name}"),
    })
}

fn consume_var_name(chars: &mut Peekable<Chars>) -> String {
    let mut var_name = String::new();

    while let Some(&c) = chars.peek() {
        if c.is_alphanumeric() || c == '_' {
            var_name.push(c);
            chars.next();
        } else {
            break;
        }
    }

    var_name
}

fn expand_env_var(var_name: &str, result: &mut String, original: &str) -> PathResult<()> {
    match var_name {
        "HOME" => result.push_str(&home_dir().to_string_lossy()),
        "XDG_CONFIG_HOME" => result.push_str(&xdg_config_home().to_string_lossy()),
        "XDG_DATA_HOME" => result.push_str(&xdg_data_home().to_string_lossy()),
        "XDG_CACHE_HOME" => result.push_str(&xdg_cache_home().to_string_lossy()),
        _ => {
            let value = env::var(var_name).map_err(|_| PathError::MissingEnvVar {
                input: original.into(),
                var: var_name.into(),
            })?;
            result.push_str(&value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_expand_variables() {
        env::set_var("BAZAAR_TEST_VAR", "test_value");
        assert_eq!(
            expand_variables("$BAZAAR_TEST_VAR/path").unwrap(),
            "test_value/path"
        );
        assert_eq!(
            expand_variables("${BAZAAR_TEST_VAR}/path").unwrap(),
            "test_value/path"
        );
        assert_eq!(expand_variables("path/$").unwrap(), "path/$");
        assert!(expand_variables("${BAZAAR_TEST_VAR").is_err());
        env::remove_var("BAZAAR_TEST_VAR");

        assert!(expand_variables("$BAZAAR_VAR_THAT_DOES_NOT_EXIST").is_err());
    }

    #[test]
    #[serial]
    fn test_xdg_directories() {
        env::set_var("HOME", "/tmp/home");
        env::remove_var("XDG_CONFIG_HOME");
        env::remove_var("XDG_CACHE_HOME");
        env::set_var("XDG_DATA_HOME", "/tmp/data");

        assert_eq!(xdg_config_home(), PathBuf::from("/tmp/home/.config"));
        assert_eq!(xdg_cache_home(), PathBuf::from("/tmp/home/.cache"));
        assert_eq!(xdg_data_home(), PathBuf::from("/tmp/data"));

        env::remove_var("XDG_DATA_HOME");
    }

    #[test]
    #[serial]
    fn test_resolve_path() {
        env::set_var("HOME", "/tmp/home");

        assert!(resolve_path("").is_err());
        assert!(resolve_path("   ").is_err());
        assert_eq!(
            resolve_path("/absolute/path").unwrap(),
            PathBuf::from("/absolute/path")
        );
        assert_eq!(
            resolve_path("~/presets").unwrap(),
            PathBuf::from("/tmp/home/presets")
        );
        assert_eq!(
            resolve_path("relative/path").unwrap(),
            env::current_dir().unwrap().join("relative/path")
        );
        assert_eq!(
            resolve_path("not/at/~/start").unwrap(),
            env::current_dir().unwrap().join("not/at/~/start")
        );
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("/opt/bazaar/pkg/1.0.0/file", "/opt/bazaar/pkg/1.0.0"));
        assert!(is_within("/opt/bazaar", "/opt/bazaar"));
        assert!(!is_within("/opt/bazaar-other/file", "/opt/bazaar"));
        assert!(!is_within("/etc/passwd", "/opt/bazaar"));
    }
}
