use std::fs;

use pyxm::{Context, EngineConfig, Environment, LoaderError, Template, TemplateError};
use tempfile::TempDir;

fn template_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
    dir
}

#[tokio::test]
async fn pyxm_extension_wins_over_html() {
    let dir = template_dir(&[("home.pyxm", "pyxm"), ("home.html", "html")]);
    let mut env = Environment::new();
    env.add_template_dir(dir.path()).unwrap();
    assert_eq!(env.render("home", Context::new()).await.unwrap(), "pyxm");
    assert_eq!(env.render("home.html", Context::new()).await.unwrap(), "html");
}

#[tokio::test]
async fn earlier_directories_win() {
    let first = template_dir(&[("page.pyxm", "first")]);
    let second = template_dir(&[("page.pyxm", "second"), ("only.pyxm", "only")]);
    let mut env = Environment::new();
    env.add_template_dir(first.path()).unwrap();
    env.add_template_dir(second.path()).unwrap();
    assert_eq!(env.render("page", Context::new()).await.unwrap(), "first");
    assert_eq!(env.render("only", Context::new()).await.unwrap(), "only");
}

#[tokio::test]
async fn configured_extensions() {
    let dir = template_dir(&[("mail.txt", "plain {{ n }}")]);
    let config = EngineConfig::default().with_template_extensions([".txt"]);
    let mut env = Environment::with_config(config);
    env.add_template_dir(dir.path()).unwrap();
    let html = env.render("mail", Context::new().with("n", 2)).await.unwrap();
    assert_eq!(html, "plain 2");
}

#[test]
fn path_traversal_is_rejected() {
    let dir = template_dir(&[("ok.pyxm", "ok")]);
    let mut env = Environment::new();
    env.add_template_dir(dir.path()).unwrap();
    let err = env.get_template("../ok").unwrap_err();
    assert!(matches!(
        err,
        TemplateError::Loader(LoaderError::InvalidName { .. })
    ));
}

#[test]
fn syntax_errors_carry_the_template_name() {
    let dir = template_dir(&[("broken.pyxm", "<div>{% if x %}</div>")]);
    let mut env = Environment::new();
    env.add_template_dir(dir.path()).unwrap();
    let err = env.get_template("broken").unwrap_err();
    assert_eq!(err.template_name(), Some("broken"));
}

#[tokio::test]
async fn from_file_and_missing_file() {
    let dir = template_dir(&[("card.pyxm", "<b>{{ x }}</b>")]);
    let template = Template::from_file(dir.path().join("card.pyxm")).unwrap();
    let html = template.render(Context::new().with("x", 1)).await.unwrap();
    assert_eq!(html, "<b>1</b>");

    let err = Template::from_file(dir.path().join("absent.pyxm")).unwrap_err();
    assert!(matches!(
        err,
        TemplateError::Loader(LoaderError::NotFound { .. })
    ));
}

#[tokio::test]
async fn config_from_yaml() {
    let config = EngineConfig::from_yaml("autoescape: false\nundefined: lenient\n").unwrap();
    let env = Environment::with_config(config);
    let html = env
        .render_str("{{ markup }}{{ absent }}", Context::new().with("markup", "<i>x</i>"))
        .await
        .unwrap();
    assert_eq!(html, "<i>x</i>");
}
