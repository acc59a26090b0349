use anyhow::Result;

use panbatch::command_buffer::packed::JobType;
use panbatch::prelude::*;

mod framework;

fn compute_cmd(context: &framework::Context) -> Result<CommandBuffer> {
    let pipeline = framework::compute_pipeline(framework::empty_layout()?, ShaderInfo::new(0x1000))?;
    let mut cmd = framework::recording(context)?;
    cmd.bind_pipeline(&Pipeline::Compute(pipeline))?;
    Ok(cmd)
}

#[test]
pub fn barrier_splits_render_pass() -> Result<()> {
    let context = framework::make_context()?;
    let mut cmd = framework::recording(&context)?;
    framework::begin_triangle_pass(&mut cmd, vk::AttachmentLoadOp::CLEAR)?;
    cmd.draw(3, 1, 0, 0)?
        .pipeline_barrier(&vk::DependencyInfo::default())?
        .draw(3, 1, 0, 0)?
        .end_rendering()?;
    cmd.end()?;

    assert_eq!(cmd.batches().len(), 2);
    for batch in cmd.batches() {
        assert_eq!(batch.job_count(JobType::Vertex), 1);
        assert_eq!(batch.job_count(JobType::Fragment), 1);
    }
    assert!(cmd.framebuffer().rts.iter().all(|rt| rt.view.is_none()));
    Ok(())
}

#[test]
pub fn barrier_without_batch_is_noop() -> Result<()> {
    let context = framework::make_context()?;
    let mut cmd = framework::recording(&context)?;
    cmd.pipeline_barrier(&vk::DependencyInfo::default())?;
    assert!(cmd.current_batch().is_none());
    cmd.end()?;
    assert!(cmd.batches().is_empty());
    Ok(())
}

#[test]
pub fn set_event_after_dispatch() -> Result<()> {
    let context = framework::make_context()?;
    let event = Event::new();
    let mut cmd = compute_cmd(&context)?;
    cmd.dispatch(1, 1, 1)?.set_event(&event)?;
    assert!(cmd.current_batch().is_none(), "Set operations close the batch holding them");
    cmd.end()?;

    assert_eq!(cmd.batches().len(), 2);
    let signal = &cmd.batches()[1];
    assert_eq!(signal.jobs().len(), 1);
    assert_eq!(signal.job_count(JobType::Null), 1, "Event operations are anchored to a null job");
    assert_eq!(signal.event_ops(), &[EventOp::Set(event.clone())]);
    assert!(cmd.batches()[0].event_ops().is_empty());

    // Executing the batches in order applies the operation.
    for op in cmd.batches().iter().flat_map(Batch::event_ops) {
        op.apply();
    }
    assert!(event.is_set());
    Ok(())
}

#[test]
pub fn set_event_inside_render_pass() -> Result<()> {
    let context = framework::make_context()?;
    let event = Event::new();
    let mut cmd = framework::recording(&context)?;
    framework::begin_triangle_pass(&mut cmd, vk::AttachmentLoadOp::CLEAR)?;
    cmd.draw(3, 1, 0, 0)?.set_event(&event)?;
    assert!(cmd.current_batch().is_some(), "Rendering continues in a new batch");
    cmd.end_rendering()?;
    cmd.end()?;

    // The batch opened after the set operation has nothing to do and is dropped.
    assert_eq!(cmd.batches().len(), 1);
    let batch = &cmd.batches()[0];
    assert_eq!(batch.event_ops(), &[EventOp::Set(event)]);
    assert_eq!(batch.job_count(JobType::Tiler), 1);
    assert_eq!(batch.job_count(JobType::Null), 0);
    Ok(())
}

#[test]
pub fn reset_event_without_work() -> Result<()> {
    let context = framework::make_context()?;
    let event = Event::new();
    event.set();
    let mut cmd = framework::recording(&context)?;
    cmd.reset_event(&event)?;
    cmd.end()?;

    assert_eq!(cmd.batches().len(), 1);
    let batch = &cmd.batches()[0];
    assert_eq!(batch.event_ops(), &[EventOp::Reset(event.clone())]);
    assert_eq!(batch.job_count(JobType::Null), 1);

    batch.event_ops()[0].apply();
    assert!(!event.is_set());
    Ok(())
}

#[test]
pub fn wait_between_dispatches() -> Result<()> {
    let context = framework::make_context()?;
    let event = Event::new();
    let mut cmd = compute_cmd(&context)?;
    cmd.dispatch(1, 1, 1)?
        .wait_events(std::slice::from_ref(&event))?
        .dispatch(1, 1, 1)?;
    cmd.end()?;

    let batches = cmd.batches();
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0].job_count(JobType::Compute), 1);
    assert_eq!(batches[1].event_ops(), &[EventOp::Wait(event)]);
    assert_eq!(batches[1].job_count(JobType::Null), 1);
    assert_eq!(batches[2].job_count(JobType::Compute), 1);
    assert!(batches[2].event_ops().is_empty());
    Ok(())
}

#[test]
pub fn wait_between_draws_splits() -> Result<()> {
    let context = framework::make_context()?;
    let first = Event::new();
    let second = Event::new();
    let mut cmd = framework::recording(&context)?;
    framework::begin_triangle_pass(&mut cmd, vk::AttachmentLoadOp::CLEAR)?;
    cmd.draw(3, 1, 0, 0)?
        .wait_events(&[first.clone(), second.clone()])?
        .draw(3, 1, 0, 0)?
        .end_rendering()?;
    cmd.end()?;

    let batches = cmd.batches();
    assert_eq!(batches.len(), 2);
    assert!(batches[0].event_ops().is_empty(), "Work recorded before a wait must not be held back");
    assert_eq!(batches[1].event_ops(), &[EventOp::Wait(first), EventOp::Wait(second)]);
    assert!(batches[1].event_ops().iter().all(EventOp::is_wait));
    assert_eq!(batches[1].job_count(JobType::Vertex), 1);
    Ok(())
}

#[test]
pub fn wait_at_start_of_render_pass() -> Result<()> {
    let context = framework::make_context()?;
    let event = Event::new();
    let mut cmd = framework::recording(&context)?;
    framework::begin_triangle_pass(&mut cmd, vk::AttachmentLoadOp::CLEAR)?;
    cmd.wait_events(std::slice::from_ref(&event))?
        .draw(3, 1, 0, 0)?
        .end_rendering()?;
    cmd.end()?;

    assert_eq!(cmd.batches().len(), 1);
    let batch = &cmd.batches()[0];
    assert_eq!(batch.event_ops(), &[EventOp::Wait(event)]);
    assert_eq!(batch.job_count(JobType::Tiler), 1);
    Ok(())
}

#[test]
pub fn events_before_render_pass_are_adopted() -> Result<()> {
    let context = framework::make_context()?;
    let event = Event::new();
    let mut cmd = framework::recording(&context)?;
    cmd.wait_events(std::slice::from_ref(&event))?;
    framework::begin_triangle_pass(&mut cmd, vk::AttachmentLoadOp::CLEAR)?;
    cmd.draw(3, 1, 0, 0)?.end_rendering()?;
    cmd.end()?;

    assert_eq!(cmd.batches().len(), 1);
    assert_eq!(cmd.batches()[0].event_ops(), &[EventOp::Wait(event)]);
    assert!(cmd.batches()[0].framebuffer().is_some());
    Ok(())
}

#[test]
pub fn events_are_shared_handles() -> Result<()> {
    let event = Event::new();
    let other = Event::new();
    assert_ne!(event.id(), other.id());
    assert_ne!(event, other);
    assert_eq!(event, event.clone());

    let op = EventOp::Set(event.clone());
    assert_eq!(op.event(), &event);
    assert!(!op.is_wait());
    op.apply();
    assert!(event.clone().is_set());
    EventOp::Wait(event.clone()).apply();
    assert!(event.is_set(), "Wait operations never change the event");
    Ok(())
}
