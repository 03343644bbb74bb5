use std::sync::Arc;
use std::thread;

use pyxm::hash::cache_key;
use pyxm::{
    CompileOptions, Context, EngineConfig, FilterRegistry, LruCache, Template, TemplateCache,
};
use serde_json::Value;

#[test]
fn capacity_plus_one_evicts_least_recent() {
    const N: usize = 4;
    let cache = LruCache::new(N);
    for i in 0..=N {
        cache.set(cache_key(&format!("t{i}"), "<p></p>", 0), i);
    }

    assert_eq!(cache.len(), N);
    assert_eq!(cache.get(&cache_key("t0", "<p></p>", 0)), None);
    for i in 1..=N {
        assert_eq!(cache.get(&cache_key(&format!("t{i}"), "<p></p>", 0)), Some(i));
    }
}

#[test]
fn access_protects_from_eviction() {
    let cache = LruCache::new(2);
    cache.set("a", 1);
    cache.set("b", 2);
    cache.get("a");
    cache.set("c", 3);
    assert_eq!(cache.get("a"), Some(1));
    assert_eq!(cache.get("b"), None);
}

#[test]
fn templates_share_compiled_form() {
    let cache: Arc<TemplateCache> = Arc::new(LruCache::new(8));
    let options = CompileOptions::default().with_cache(Arc::clone(&cache));

    let first = Template::compile_with("page", "<h1>{{ t }}</h1>", &options).unwrap();
    let second = Template::compile_with("page", "<h1>{{ t }}</h1>", &options).unwrap();
    assert!(Arc::ptr_eq(first.compiled(), second.compiled()));

    assert!(cache.contains(&options.cache_key("page", "<h1>{{ t }}</h1>")));
}

#[test]
fn edited_source_gets_a_new_entry() {
    let cache: Arc<TemplateCache> = Arc::new(LruCache::new(8));
    let options = CompileOptions::default().with_cache(Arc::clone(&cache));

    let old = Template::compile_with("page", "<p>{{ a }}</p>", &options).unwrap();
    let new = Template::compile_with("page", "<p>{{ b }}</p>", &options).unwrap();
    assert!(!Arc::ptr_eq(old.compiled(), new.compiled()));
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn options_sharing_a_cache_keep_their_own_settings() {
    let cache: Arc<TemplateCache> = Arc::new(LruCache::new(8));
    let escaped = CompileOptions::default().with_cache(Arc::clone(&cache));
    let raw = CompileOptions::new(EngineConfig::default().with_autoescape(false))
        .with_cache(Arc::clone(&cache));

    let ctx = || Context::new().with("x", "<b>");
    let first = Template::compile_with("t", "{{ x }}", &escaped).unwrap();
    let second = Template::compile_with("t", "{{ x }}", &raw).unwrap();

    assert_eq!(cache.len(), 2);
    assert_eq!(first.render(ctx()).await.unwrap(), "&lt;b&gt;");
    assert_eq!(second.render(ctx()).await.unwrap(), "<b>");
}

#[test]
fn replacing_a_filter_changes_the_key() {
    let plain = CompileOptions::default();
    let mut filters = FilterRegistry::default();
    filters.register("upper", |v: &Value, _: &[Value]| Ok(v.clone()));
    let custom = CompileOptions::default().with_filters(filters);

    assert_eq!(
        plain.cache_key("t", "{{ x | upper }}"),
        CompileOptions::default().cache_key("t", "{{ x | upper }}")
    );
    assert_ne!(
        plain.cache_key("t", "{{ x | upper }}"),
        custom.cache_key("t", "{{ x | upper }}")
    );
}

#[test]
fn concurrent_access() {
    let cache = Arc::new(LruCache::new(16));
    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..200 {
                    let key = format!("k{}", (worker * 7 + i) % 32);
                    if cache.get(&key).is_none() {
                        cache.set(key, i);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(cache.len() <= 16);
    assert_eq!(cache.keys().len(), cache.len());
}

#[test]
fn concurrent_compiles_agree() {
    let cache: Arc<TemplateCache> = Arc::new(LruCache::new(4));
    let options = Arc::new(CompileOptions::default().with_cache(Arc::clone(&cache)));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let options = Arc::clone(&options);
            thread::spawn(move || {
                Template::compile_with("shared", "<b>{{ x }}</b>", &options)
                    .unwrap()
                    .compiled()
                    .source_hash()
                    .to_string()
            })
        })
        .collect();
    let hashes: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(hashes.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(cache.len(), 1);
}
