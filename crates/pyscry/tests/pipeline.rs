//! End-to-end pipeline tests: module resolution, registries, stub
//! synthesis, and inference flowing across module boundaries.

use std::rc::Rc;

use pyscry::test_support::{find_name, node_ref};
use pyscry::{
    Candidate, ConstValue, InferenceEngine, Manager, Module, NodeKind, NodeTag, RuntimeClass,
    RuntimeModule, RuntimeValue,
};

fn infer_in(manager: &mut Manager, module: &Rc<Module>, name: &str) -> Vec<Candidate> {
    let target = node_ref(module, find_name(module, name).expect("name occurrence"));
    InferenceEngine::new(manager)
        .infer(&target)
        .candidates()
        .to_vec()
}

fn int(v: i64) -> Candidate {
    Candidate::Const(ConstValue::Int(v))
}

#[test]
fn stub_synthesis_is_byte_exact() {
    let error = RuntimeClass::new("Error")
        .exception()
        .member("errno", RuntimeValue::Int(0))
        .member("__str__", RuntimeValue::Method);
    let native = RuntimeModule::new("audio._native")
        .member("open", RuntimeValue::Function)
        .member("RATE", RuntimeValue::Int(44100))
        .member("close", RuntimeValue::BuiltinFunction)
        .member("poll", RuntimeValue::Method)
        .member("Error", RuntimeValue::Class(error));

    let expected = concat!(
        "# audio._native constants\n",
        "\n",
        "RATE = 44100\n",
        "\n",
        "# audio._native functions\n",
        "\n",
        "def close(*args, **kwargs):\n",
        "    pass\n",
        "def open(*args, **kwargs):\n",
        "    pass\n",
        "\n",
        "# audio._native methods\n",
        "\n",
        "def poll(self, *args, **kwargs):\n",
        "    pass\n",
        "\n",
        "# audio._native classes\n",
        "\n",
        "class Error(Exception):\n",
        "    # Error constants\n",
        "    \n",
        "    errno = 0\n",
        "    \n",
        "    # Error methods\n",
        "    \n",
        "    def __str__(self, *args, **kwargs):\n",
        "        pass\n",
        "    \n",
        "\n",
    );
    assert_eq!(pyscry::modules_stub(&[native]).unwrap(), expected);
}

#[test]
fn stubbed_modules_import_like_any_other() {
    let mut manager = Manager::new();
    let native = RuntimeModule::new("audio._native")
        .member("RATE", RuntimeValue::Int(44100))
        .member("open", RuntimeValue::Function);
    let stub = manager
        .build_from_live_objects("audio._native", &[native])
        .unwrap();
    assert!(stub.has_local("RATE"));
    assert!(stub.has_local("open"));

    let app = manager
        .build_from_text("import audio._native as nat\nx = nat.RATE\nx\n", "app")
        .unwrap();
    assert_eq!(infer_in(&mut manager, &app, "x"), [int(44100)]);
}

#[test]
fn failed_import_hooks_feed_the_resolver() {
    let mut manager = Manager::new();
    manager.register_failed_import_hook(|name| {
        name.starts_with("bindings.").then(|| {
            let module = RuntimeModule::new(name).member("VERSION", RuntimeValue::Int(7));
            let stub = pyscry::modules_stub(&[module]).expect("stub");
            pyscry::build_from_text(&stub, name).map_err(Into::into)
        })
    });
    let app = manager
        .build_from_text("import bindings.core as core\nx = core.VERSION\nx\n", "app")
        .unwrap();
    assert_eq!(infer_in(&mut manager, &app, "x"), [int(7)]);
}

#[test]
fn modules_resolve_and_infer_across_files() {
    let dir = tempfile::tempdir().unwrap();
    let pkg = dir.path().join("pkg");
    std::fs::create_dir(&pkg).unwrap();
    std::fs::write(pkg.join("__init__.py"), "").unwrap();
    std::fs::write(pkg.join("a.py"), "V = 1\n").unwrap();
    std::fs::write(pkg.join("b.py"), "from .a import V\nx = V\nx\n").unwrap();

    let mut manager = Manager::new();
    manager.add_search_path(dir.path());
    let b = manager.ast_from_module_name("pkg.b").unwrap();
    assert_eq!(infer_in(&mut manager, &b, "x"), [int(1)]);
}

#[test]
fn factory_functions_infer_to_instances_across_modules() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("net.py"),
        "class Client:\n    def __init__(self):\n        self.retries = 3\n\ndef connect():\n    return Client()\n",
    )
    .unwrap();

    let mut manager = Manager::new();
    manager.add_search_path(dir.path());
    let app = manager
        .build_from_text("import net\nc = net.connect()\nx = c.retries\nx\n", "app")
        .unwrap();
    assert_eq!(infer_in(&mut manager, &app, "x"), [int(3)]);
}

#[test]
fn extended_modules_expose_grafted_names_to_importers() {
    let mut manager = Manager::new();
    manager.register_module_extender("config", || {
        pyscry::build_from_text("TIMEOUT = 30\n", "config_extension")
    });
    manager.build_from_text("DEBUG = False\n", "config").unwrap();
    let app = manager
        .build_from_text("from config import TIMEOUT\nx = TIMEOUT\nx\n", "app")
        .unwrap();
    assert_eq!(infer_in(&mut manager, &app, "x"), [int(30)]);
}

#[test]
fn transforms_apply_to_stub_builds_too() {
    let mut manager = Manager::new();
    manager.register_transform_with_predicate(
        NodeTag::Const,
        |tree, id| matches!(tree.kind(id), NodeKind::Const { value: ConstValue::Int(44100) }),
        |tree, id| {
            if let NodeKind::Const { value } = &mut tree.node_mut(id).kind {
                *value = ConstValue::Int(48000);
            }
        },
    );
    let native = RuntimeModule::new("audio._native").member("RATE", RuntimeValue::Int(44100));
    manager
        .build_from_live_objects("audio._native", &[native])
        .unwrap();
    let app = manager
        .build_from_text("import audio._native as nat\nx = nat.RATE\nx\n", "app")
        .unwrap();
    assert_eq!(infer_in(&mut manager, &app, "x"), [int(48000)]);
}

#[test]
fn declared_encodings_are_honored_for_file_builds() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("enc.py");
    std::fs::write(&path, b"# -*- coding: latin-1 -*-\nNAME = '\xe9'\n").unwrap();

    let mut manager = Manager::new();
    let module = manager.build_from_path(&path, "enc").unwrap();
    assert!(module.has_local("NAME"));
    let decoded = module.tree.ids().any(|id| {
        matches!(
            module.tree.kind(id),
            NodeKind::Const { value: ConstValue::Str(s) } if s == "\u{e9}"
        )
    });
    assert!(decoded, "latin-1 payload survived decoding");
}

#[test]
fn stub_source_for_nested_classes_round_trips() {
    let inner = RuntimeClass::new("Timeout").exception();
    let outer = RuntimeClass::new("Session")
        .member("request", RuntimeValue::Method)
        .member("Timeout", RuntimeValue::Class(inner));
    let module = RuntimeModule::new("web").member("Session", RuntimeValue::Class(outer));

    let mut manager = Manager::new();
    let web = manager.build_from_live_objects("web", &[module]).unwrap();
    assert!(web.has_local("Session"));
    let session = web.locals("Session").unwrap()[0];
    let info = web.tree.scope_info(session).expect("class scope");
    assert!(info.has_local("request"));
    assert!(info.has_local("Timeout"));
}
