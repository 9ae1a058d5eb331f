use super::*;

use crate::vm::pic::{BASE_ENTRIES, MAX_ENTRIES, META_KEY_BIT, receiver_key};

fn cycle(site: &MethodCallSite, classes: &[Arc<Class>], calls: usize, start: usize) -> usize {
    let receivers: Vec<Value> = classes.iter().map(|c| c.instantiate()).collect();
    for i in start..start + calls {
        let out = call(site, &receivers[i % receivers.len()]).unwrap();
        let expected = format!("{}.m", classes[i % classes.len()].name());
        assert_eq!(out, Value::str(&expected));
    }
    start + calls
}

#[test]
fn test_monomorphic_site_hits_after_first_miss() {
    let site = MethodCallSite::new("m", PicConfig::default());
    let class = class_answering("Mono", "m");
    let recv = class.instantiate();
    for _ in 0..1000 {
        assert_eq!(call(&site, &recv).unwrap(), Value::str("Mono.m"));
    }
    let stats = site.stats();
    assert_eq!((stats.misses, stats.hits), (1, 999));
    assert_eq!(stats.active_slots, BASE_ENTRIES);
    assert!(!stats.promoted);
    assert_eq!(site.entry_kinds(), vec![Some("direct-slot"), None]);
}

#[test]
fn test_entries_move_to_front() {
    let site = MethodCallSite::new("m", PicConfig::default());
    let classes = distinct_classes(3, "m");
    let [a, b, c] = [0, 1, 2].map(|i| classes[i].instantiate());
    for recv in [&a, &b, &a, &c, &a, &b] {
        call(&site, recv).unwrap();
    }
    // a hit moved A ahead of B, so C evicted B; A hit again, B missed
    let stats = site.stats();
    assert_eq!((stats.misses, stats.hits), (4, 2));
}

#[test]
fn test_promotion_under_sustained_polymorphism() {
    let site = MethodCallSite::new("m", PicConfig::default());
    let classes = distinct_classes(4, "m");

    let next = cycle(&site, &classes, 255, 0);
    assert!(!site.is_promoted());
    assert_eq!(site.stats().misses, 255);

    let next = cycle(&site, &classes, 1, next);
    assert!(site.is_promoted());
    assert_eq!(site.active_slots(), MAX_ENTRIES);
    assert_eq!(site.stats().promotions, 1);

    // after one warm-up round the 3rd and 4th classes hit as well
    let next = cycle(&site, &classes, 8, next);
    let misses = site.stats().misses;
    cycle(&site, &classes, 400, next);
    let stats = site.stats();
    assert_eq!(stats.misses, misses);
    assert!(stats.promoted);
    assert_eq!(stats.entries, 4);
    assert_eq!(stats.demotions, 0);
}

#[test]
fn test_bimorphic_site_never_promotes() {
    let site = MethodCallSite::new("m", PicConfig::default());
    let classes = distinct_classes(2, "m");
    cycle(&site, &classes, 5_000, 0);
    let stats = site.stats();
    assert_eq!(stats.misses, 2);
    assert!(!stats.promoted);
}

#[test]
fn test_demotion_and_freeze() {
    let cfg = PicConfig::default();
    let site = MethodCallSite::new("m", cfg);
    let four = distinct_classes(4, "m");
    cycle(&site, &four, 256 + 8, 0);
    assert!(site.is_promoted());

    // eight classes overflow four entries: every call misses
    let eight = distinct_classes(8, "m");
    let receivers: Vec<Value> = eight.iter().map(|c| c.instantiate()).collect();
    let mut i = 0;
    while site.stats().demotions == 0 {
        call(&site, &receivers[i % 8]).unwrap();
        i += 1;
        assert!(i <= 2 * cfg.window as usize, "site never demoted");
    }
    let stats = site.stats();
    assert!(!stats.promoted);
    assert_eq!(stats.active_slots, BASE_ENTRIES);
    assert_eq!(stats.freeze_remaining, cfg.freeze_windows);
    assert_eq!(stats.entries, 2);

    // frozen windows cannot re-promote, however bad the miss rate
    let frozen = (cfg.freeze_windows * cfg.window) as usize - 1;
    for _ in 0..frozen {
        call(&site, &receivers[i % 8]).unwrap();
        i += 1;
    }
    let stats = site.stats();
    assert!(!stats.promoted);
    assert_eq!(stats.promotions, 1);
    assert_eq!(stats.freeze_remaining, 1);

    // the last frozen window closes and promotion may fire again
    call(&site, &receivers[i % 8]).unwrap();
    let stats = site.stats();
    assert_eq!(stats.freeze_remaining, 0);
    assert!(stats.promoted);
    assert_eq!(stats.promotions, 2);
}

#[test]
fn test_resolution_failure_is_cached() {
    let site = MethodCallSite::new("missing", PicConfig::default());
    let recv = class_answering("Lonely", "present").instantiate();
    let mut ctx = CallContext::new();

    let first = site.invoke(&mut ctx, &recv, &[]).unwrap_err();
    assert_eq!(ctx.stats().resolutions, 1);
    let second = site.invoke(&mut ctx, &recv, &[]).unwrap_err();
    assert_eq!(ctx.stats().resolutions, 1);

    assert_eq!(first.to_string(), second.to_string());
    assert_eq!(
        second.downcast_ref::<VmError>(),
        Some(&VmError::method_not_found("Lonely", "missing"))
    );
    let stats = site.stats();
    assert_eq!((stats.misses, stats.hits), (1, 1));
    assert_eq!(site.entry_kinds()[0], Some("cached-error"));
}

#[test]
fn test_class_value_dispatch_uses_class_scope() {
    let class = Class::new("Factory");
    class.define_static("create", labelled("Factory.create"));
    class.define_method("create", Visibility::Public, labelled("instance create"));

    let site = MethodCallSite::new("create", PicConfig::default());
    let as_class = Value::Class(Arc::clone(&class));
    let as_instance = class.instantiate();
    assert_eq!(call(&site, &as_class).unwrap(), Value::str("Factory.create"));
    assert_eq!(call(&site, &as_instance).unwrap(), Value::str("instance create"));
    assert_eq!(call(&site, &as_class).unwrap(), Value::str("Factory.create"));
    assert_eq!(call(&site, &as_instance).unwrap(), Value::str("instance create"));

    let stats = site.stats();
    assert_eq!((stats.misses, stats.hits), (2, 2));

    let (class_key, _) = receiver_key(&as_class).unwrap();
    let (inst_key, _) = receiver_key(&as_instance).unwrap();
    assert_eq!(class_key, inst_key | META_KEY_BIT);
}

#[test]
fn test_missing_class_scope_member() {
    let class = Class::new("Plain");
    let site = MethodCallSite::new("build", PicConfig::default());
    let err = call(&site, &Value::Class(class)).unwrap_err();
    assert_eq!(err.to_string(), "MethodNotFound: method 'build' not found on class Plain");
}

#[test]
fn test_uncacheable_receivers_go_cold() {
    let site = MethodCallSite::new("len", PicConfig::default());
    for _ in 0..3 {
        let err = call(&site, &Value::Int(3)).unwrap_err();
        assert_eq!(err.to_string(), "MethodNotFound: method 'len' not found on Int");
    }
    let stats = site.stats();
    assert_eq!((stats.cold, stats.misses, stats.hits), (3, 0, 0));
    assert!(receiver_key(&Value::Nil).is_none());
}

#[test]
fn test_abstract_method_caches_fallback() {
    let shape = Class::new("Shape");
    shape.define_abstract("area", Visibility::Public);
    let site = MethodCallSite::new("area", PicConfig::default());
    let recv = shape.instantiate();
    for _ in 0..2 {
        let err = call(&site, &recv).unwrap_err();
        assert_eq!(err.to_string(), "MethodNotFound: method 'area' of Shape is abstract");
    }
    assert_eq!(site.entry_kinds()[0], Some("fallback"));
    assert_eq!(site.stats().hits, 1);
}

#[test]
fn test_always_four_starts_wide_and_never_adapts() {
    let cfg = PicConfig {
        always_four: true,
        ..PicConfig::default()
    };
    let site = MethodCallSite::new("m", cfg);
    assert_eq!(site.active_slots(), MAX_ENTRIES);
    let classes = distinct_classes(4, "m");
    cycle(&site, &classes, 1_000, 0);
    let stats = site.stats();
    assert_eq!(stats.misses, 4);
    assert_eq!(stats.promotions, 0);
    assert!(!stats.promoted);
}

#[test]
fn test_non_adaptive_site_stays_narrow() {
    let cfg = PicConfig {
        adaptive: false,
        ..PicConfig::default()
    };
    let site = MethodCallSite::new("m", cfg);
    let classes = distinct_classes(3, "m");
    cycle(&site, &classes, 3_000, 0);
    let stats = site.stats();
    assert_eq!(stats.active_slots, BASE_ENTRIES);
    assert_eq!(stats.misses, 3_000);
}

#[test]
fn test_disabled_cache_dispatches_cold() {
    let site = MethodCallSite::new("m", PicConfig::disabled());
    let classes = distinct_classes(2, "m");
    cycle(&site, &classes, 10, 0);
    let stats = site.stats();
    assert_eq!((stats.cold, stats.hits, stats.misses, stats.entries), (10, 0, 0, 0));
}

#[test]
fn test_counters_respect_tuning() {
    let cfg = PicConfig {
        promote_after: 16,
        window: 16,
        ..PicConfig::default()
    };
    let site = MethodCallSite::new("m", cfg);
    let classes = distinct_classes(3, "m");
    cycle(&site, &classes, 16, 0);
    assert!(site.is_promoted());
}
