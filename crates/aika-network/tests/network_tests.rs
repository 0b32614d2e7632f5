//! Tests for aika-network: linking, latent relations, inhibition, training

use aika_core::{Config, Error, TextRange};
use aika_network::*;
use aika_search::{Change, Decision, SearchSpace};
use bytes::BytesMut;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Two tokens "a" and "b", one binding neuron each, both feeding pattern "ab".
struct AbNet {
    model: Arc<Model>,
    a: aika_core::NeuronId,
    b: aika_core::NeuronId,
    ba: aika_core::NeuronId,
    bb: aika_core::NeuronId,
    p: aika_core::NeuronId,
    s_b: aika_core::SynapseId,
    primary_a: aika_core::SynapseId,
}

fn ab_net(config: Config, weight: f64, second: SynapseSpec) -> AbNet {
    let model = Arc::new(Model::new(config));
    let a = model.create_neuron(NeuronKind::Pattern, "a");
    let b = model.create_neuron(NeuronKind::Pattern, "b");
    let ba = model.create_neuron(NeuronKind::Binding, "a-binding");
    let bb = model.create_neuron(NeuronKind::Binding, "b-binding");
    let p = model.create_neuron(NeuronKind::Pattern, "ab");
    model.set_bias(p, 1.0).unwrap();

    let primary_a = model
        .connect(SynapseSpec::new(SynapseKind::PrimaryInput, a, ba).weight(weight))
        .unwrap();
    model
        .connect(SynapseSpec::new(SynapseKind::PrimaryInput, b, bb).weight(weight))
        .unwrap();
    model
        .connect(SynapseSpec::new(SynapseKind::InputPattern, ba, p).weight(10.0))
        .unwrap();
    let mut spec = second;
    spec.input = bb;
    spec.output = p;
    let s_b = model.connect(spec).unwrap();
    AbNet {
        model,
        a,
        b,
        ba,
        bb,
        p,
        s_b,
        primary_a,
    }
}

fn latent_second() -> SynapseSpec {
    SynapseSpec::new(
        SynapseKind::InputPattern,
        aika_core::NeuronId(0),
        aika_core::NeuronId(0),
    )
    .weight(10.0)
    .latent(true)
}

fn ab_document(net: &AbNet, token_net: f64) -> Document {
    let mut doc = Document::new(net.model.clone(), "a b");
    doc.add_token(net.a, 0, TextRange::new(0, 1), token_net).unwrap();
    doc.add_token(net.b, 1, TextRange::new(2, 3), token_net).unwrap();
    doc.process().unwrap();
    doc
}

/// One token feeding two rival binding neurons that share an inhibitory loop.
struct RivalNet {
    model: Arc<Model>,
    t: aika_core::NeuronId,
    b1: aika_core::NeuronId,
    b2: aika_core::NeuronId,
    i: aika_core::NeuronId,
}

fn rival_net(config: Config) -> RivalNet {
    let model = Arc::new(Model::new(config));
    let t = model.create_neuron(NeuronKind::Pattern, "t");
    let b1 = model.create_neuron(NeuronKind::Binding, "strong");
    let b2 = model.create_neuron(NeuronKind::Binding, "weak");
    let i = model.create_neuron(NeuronKind::Inhibitory, "either");
    for (b, w) in [(b1, 1.0), (b2, 0.5)] {
        model
            .connect(SynapseSpec::new(SynapseKind::PrimaryInput, t, b).weight(w))
            .unwrap();
        model
            .connect(SynapseSpec::new(SynapseKind::Inhibitory, b, i).weight(1.0))
            .unwrap();
        model
            .connect(SynapseSpec::new(SynapseKind::NegativeFeedback, i, b).weight(-2.0))
            .unwrap();
    }
    RivalNet { model, t, b1, b2, i }
}

fn rival_document(net: &RivalNet) -> Document {
    let mut doc = Document::new(net.model.clone(), "t");
    doc.add_token(net.t, 0, TextRange::new(0, 1), 10.0).unwrap();
    doc.process().unwrap();
    doc
}

// ===========================================================================
// Model validation
// ===========================================================================

#[test]
fn synapse_kinds_check_neuron_kinds() {
    let model = Model::default();
    let pattern = model.create_neuron(NeuronKind::Pattern, "p");
    let binding = model.create_neuron(NeuronKind::Binding, "b");

    let err = model
        .connect(SynapseSpec::new(SynapseKind::InputPattern, pattern, binding))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidSynapse(_)));

    let err = model
        .connect(
            SynapseSpec::new(SynapseKind::PrimaryInput, pattern, binding)
                .relation(Relation::Precedes),
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidSynapse(_)));

    assert!(model
        .connect(SynapseSpec::new(SynapseKind::PrimaryInput, pattern, binding))
        .is_ok());
}

#[test]
fn templates_must_belong_to_the_same_neuron() {
    let model = Model::default();
    let ba = model.create_neuron(NeuronKind::Binding, "ba");
    let bb = model.create_neuron(NeuronKind::Binding, "bb");
    let p = model.create_neuron(NeuronKind::Pattern, "p");
    let q = model.create_neuron(NeuronKind::Pattern, "q");

    let template = model
        .connect(SynapseSpec::new(SynapseKind::InputPattern, ba, p))
        .unwrap();
    let err = model
        .connect(SynapseSpec::new(SynapseKind::InputPattern, bb, q).template(template))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidSynapse(_)));

    let err = model
        .connect(
            SynapseSpec::new(SynapseKind::InputPattern, bb, p)
                .template(aika_core::SynapseId(99)),
        )
        .unwrap_err();
    assert!(matches!(err, Error::SynapseNotFound(_)));

    let instance = model
        .connect(SynapseSpec::new(SynapseKind::InputPattern, bb, p).template(template))
        .unwrap();
    assert_eq!(model.synapse(instance).unwrap().template, Some(template));
    assert_eq!(model.input_synapses(p).unwrap().len(), 2);
    assert_eq!(model.output_synapses(ba).unwrap().len(), 1);
}

// ===========================================================================
// Linking
// ===========================================================================

#[test]
fn latent_relation_joins_existing_pattern() {
    let net = ab_net(Config::default(), 10.0, latent_second());
    let doc = ab_document(&net, 10.0);

    let patterns = doc.activations_of(net.p);
    assert_eq!(patterns.len(), 1);
    let p = patterns[0];

    let bb = doc.activations_of(net.bb)[0];
    let link = doc.link_between(bb, p).expect("latent link");
    assert_eq!(link.synapse, net.s_b);
    assert_eq!(link.latent_relation, Some(Relation::Precedes));

    let act = doc.activation(p).unwrap();
    assert_eq!(act.range, Some(TextRange::new(0, 3)));
    assert_eq!(act.input_links().len(), 2);
    assert!(doc.value(p).unwrap() > 0.38);
    assert!(doc.is_fired(p));
}

#[test]
fn pattern_collects_related_signals() {
    let net = ab_net(Config::default(), 10.0, latent_second());
    let doc = ab_document(&net, 10.0);
    let p = doc.activations_of(net.p)[0];
    let ta = doc.activations_of(net.a)[0];
    let tb = doc.activations_of(net.b)[0];

    let related: Vec<_> = doc
        .signals_of(p)
        .unwrap()
        .into_iter()
        .filter(|s| s.state == SignalState::Pattern(Scope::Related))
        .map(|s| s.origin_activation)
        .collect();
    assert!(related.contains(&ta));
    assert!(related.contains(&tb));

    // derived signals keep their token origin
    let ba = doc.activations_of(net.ba)[0];
    let input = doc
        .signals_of(ba)
        .unwrap()
        .into_iter()
        .find(|s| s.state == SignalState::Pattern(Scope::Input))
        .unwrap();
    assert_eq!(input.origin_activation, ta);
    assert_eq!(input.depth, 1);
}

#[test]
fn explicit_relation_links_through_coincidence() {
    let second = SynapseSpec::new(
        SynapseKind::InputPattern,
        aika_core::NeuronId(0),
        aika_core::NeuronId(0),
    )
    .weight(10.0)
    .relation(Relation::Precedes);
    let net = ab_net(Config::default(), 10.0, second);
    let doc = ab_document(&net, 10.0);

    let patterns = doc.activations_of(net.p);
    assert_eq!(patterns.len(), 1);
    let bb = doc.activations_of(net.bb)[0];
    let link = doc.link_between(bb, patterns[0]).expect("bi link");
    assert_eq!(link.latent_relation, None);
}

#[test]
fn unmet_relation_spawns_separate_pattern() {
    let second = SynapseSpec::new(
        SynapseKind::InputPattern,
        aika_core::NeuronId(0),
        aika_core::NeuronId(0),
    )
    .weight(10.0)
    .relation(Relation::Follows);
    let net = ab_net(Config::default(), 10.0, second);
    let doc = ab_document(&net, 10.0);

    let patterns = doc.activations_of(net.p);
    assert_eq!(patterns.len(), 2);
    let bb = doc.activations_of(net.bb)[0];
    assert!(doc.link_between(bb, patterns[0]).is_none());
    assert!(doc.link_between(bb, patterns[1]).is_some());
}

#[test]
fn unrelated_inputs_without_latent_linking_stay_apart() {
    let second = SynapseSpec::new(
        SynapseKind::InputPattern,
        aika_core::NeuronId(0),
        aika_core::NeuronId(0),
    )
    .weight(10.0);
    let net = ab_net(Config::default(), 10.0, second);
    let doc = ab_document(&net, 10.0);
    assert_eq!(doc.activations_of(net.p).len(), 2);
}

// ===========================================================================
// Inhibition and interpretation search
// ===========================================================================

#[test]
fn rivals_share_one_inhibitory_activation() {
    let net = rival_net(Config::default());
    let doc = rival_document(&net);

    assert_eq!(doc.activations_of(net.i).len(), 1);
    let b1 = doc.activations_of(net.b1)[0];
    let b2 = doc.activations_of(net.b2)[0];
    assert_eq!(doc.conflicts_of(b1).unwrap(), vec![b2]);
    assert_eq!(doc.conflicts_of(b2).unwrap(), vec![b1]);
}

#[test]
fn strongest_rival_wins_the_search() {
    let net = rival_net(Config::default());
    let mut doc = rival_document(&net);
    let b1 = doc.activations_of(net.b1)[0];
    let b2 = doc.activations_of(net.b2)[0];

    let outcome = doc.anneal().unwrap();
    assert!(!outcome.interrupted);
    assert_eq!(outcome.decision(b1), Decision::Selected);
    assert_eq!(outcome.decision(b2), Decision::Excluded);

    assert_eq!(doc.activation(b2).unwrap().decision, Decision::Excluded);
    assert!(doc.value(b2).unwrap().abs() < 1e-9);
    assert!(doc.value(b1).unwrap() > 0.7);
    assert!(doc.activation(b1).unwrap().norm_weight.normalized() > 0.7);
}

#[test]
fn anneal_space_restores_rounds_after_decisions() {
    let net = rival_net(Config::default());
    let doc = rival_document(&net);
    let b1 = doc.activations_of(net.b1)[0];
    let b2 = doc.activations_of(net.b2)[0];

    let mut space = AnnealSpace::snapshot(&doc).unwrap();
    let before = space.rounds().to_vec();

    let selected = space.apply(b1, Decision::Selected).unwrap();
    let excluded = space.apply(b2, Decision::Excluded).unwrap();
    let after = space.rounds().to_vec();
    assert_ne!(after, before);

    space.restore(&excluded, Change::Old).unwrap();
    space.restore(&selected, Change::Old).unwrap();
    assert_eq!(space.rounds(), before.as_slice());
    assert_eq!(space.decision(b1), Decision::Unknown);
    assert_eq!(space.decision(b2), Decision::Unknown);

    space.restore(&selected, Change::New).unwrap();
    space.restore(&excluded, Change::New).unwrap();
    assert_eq!(space.rounds(), after.as_slice());
}

#[test]
fn step_limit_interrupts_search() {
    let config = Config {
        max_search_steps: 1,
        ..Config::default()
    };
    let net = rival_net(config);
    let mut doc = rival_document(&net);
    doc.anneal().unwrap();
    assert!(doc.interrupted());
}

// ===========================================================================
// Training
// ===========================================================================

#[test]
fn update_model_is_noop_when_training_disabled() {
    let net = ab_net(Config::default(), 10.0, latent_second());
    let mut doc = ab_document(&net, 10.0);
    let update = doc.update_model().unwrap();
    assert!(update.is_empty());
    assert_eq!(net.model.synapse(net.primary_a).unwrap().weight, 10.0);
}

#[test]
fn training_strengthens_active_inputs() {
    let net = ab_net(Config::default().with_training(true), 0.5, latent_second());
    let mut doc = ab_document(&net, 1.0);
    doc.anneal().unwrap();
    let update = doc.update_model().unwrap();

    assert!(!update.is_empty());
    let weight = net.model.synapse(net.primary_a).unwrap().weight;
    assert!(weight > 0.5, "weight {} should grow", weight);
    let bias = net.model.read(net.ba, |n| n.bias).unwrap();
    assert!(bias > 0.0);

    let ba = doc.activations_of(net.ba)[0];
    assert!(doc.activation(ba).unwrap().training.is_some());
}

#[test]
fn links_sharing_a_synapse_decay_the_weight_once() {
    let config = Config {
        alpha: Some(0.5),
        ..Config::default().with_training(true)
    };
    let net = ab_net(config, 0.5, latent_second());
    let mut doc = Document::new(net.model.clone(), "a a");
    doc.add_token(net.a, 0, TextRange::new(0, 1), 1.0).unwrap();
    doc.add_token(net.a, 1, TextRange::new(2, 3), 1.0).unwrap();
    doc.process().unwrap();
    let update = doc.update_model().unwrap();

    let deltas: Vec<f64> = doc
        .links()
        .iter()
        .filter(|l| l.synapse == net.primary_a)
        .filter_map(|l| l.weight_update)
        .map(|f| doc.field_graph().value(f).unwrap())
        .collect();
    assert_eq!(deltas.len(), 2);
    let expected = 0.5 * 0.5 + deltas.iter().sum::<f64>();
    let weight = net.model.synapse(net.primary_a).unwrap().weight;
    assert!((weight - expected).abs() < 1e-12);
    assert_eq!(
        update
            .weights
            .iter()
            .filter(|(s, _)| *s == net.primary_a)
            .count(),
        1
    );
}

#[test]
fn concurrent_weight_updates_are_not_lost() {
    let net = ab_net(Config::default(), 0.0, latent_second());
    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..250 {
                    net.model.update_weight(net.primary_a, |w| w + 1.0).unwrap();
                }
            });
        }
    });
    assert_eq!(net.model.synapse(net.primary_a).unwrap().weight, 2000.0);
}

// ===========================================================================
// Post-processing and lifecycle
// ===========================================================================

#[test]
fn post_processing_labels_and_reports_patterns() {
    let config = Config::default().with_label_fn(|ctx| {
        format!("{}:{}", ctx.neuron_label, ctx.text.unwrap_or("").to_uppercase())
    });
    let net = ab_net(config, 10.0, latent_second());
    let mut doc = ab_document(&net, 10.0);
    doc.anneal().unwrap();
    let summary = doc.post_processing().unwrap();

    let p = doc.activations_of(net.p)[0];
    assert_eq!(doc.activation(p).unwrap().label.as_deref(), Some("ab:A B"));

    assert_eq!(summary.patterns.len(), 1);
    let pattern = summary.pattern(p).unwrap();
    assert_eq!(pattern.inputs.len(), 2);
    assert!(pattern
        .inputs
        .iter()
        .any(|i| i.latent_relation == Some(Relation::Precedes)));

    let json = summary.to_json().unwrap();
    assert!(json.contains("\"precedes\""));
}

#[test]
fn default_labels_use_text_range() {
    let net = ab_net(Config::default(), 10.0, latent_second());
    let mut doc = ab_document(&net, 10.0);
    let summary = doc.post_processing().unwrap();
    let ta = doc.activations_of(net.a)[0];
    let entry = summary.activations.iter().find(|a| a.id == ta).unwrap();
    assert_eq!(entry.label, "a[0..1]");
}

#[test]
fn activation_values_use_field_binary_layout() {
    let net = ab_net(Config::default(), 10.0, latent_second());
    let doc = ab_document(&net, 10.0);
    let ta = doc.activations_of(net.a)[0];
    let mut buf = BytesMut::new();
    doc.write_activation(ta, &mut buf).unwrap();
    assert_eq!(buf.len(), 18);
    assert_eq!(buf[0], 1);
}

#[test]
fn disconnect_is_idempotent() {
    let net = ab_net(Config::default(), 10.0, latent_second());
    let mut doc = ab_document(&net, 10.0);
    assert!(doc.disconnect().unwrap() > 0);
    assert_eq!(doc.disconnect().unwrap(), 0);
    assert!(doc.is_disconnected());
    assert!(matches!(doc.process(), Err(Error::DocumentDisconnected)));
    assert!(matches!(
        doc.add_token(net.a, 2, TextRange::new(4, 5), 1.0),
        Err(Error::DocumentDisconnected)
    ));
}

#[test]
fn documents_process_in_parallel_against_one_model() {
    let net = ab_net(Config::default(), 10.0, latent_second());
    let values: Vec<f64> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(|| {
                    let doc = ab_document(&net, 10.0);
                    let p = doc.activations_of(net.p)[0];
                    doc.value(p).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(values.iter().all(|v| (v - values[0]).abs() < 1e-9));
}
