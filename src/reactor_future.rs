//! The three reactor awaitables (spec.md §4.2): `AcceptAsync`, `ReadAsync`,
//! `WriteAsync`. Each future registers an operation slot on first poll,
//! submits the matching SQE, and resolves once the reactor's completion
//! pass calls its waker.

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::reactor::{OpKind, Reactor};

enum State {
    /// Not yet submitted to the reactor.
    Start,
    /// Submitted; waiting for a completion.
    InFlight(usize),
}

pub struct AcceptFuture {
    reactor: Rc<Reactor>,
    fd: i32,
    state: State,
}

impl AcceptFuture {
    pub fn new(reactor: Rc<Reactor>, fd: i32) -> Self {
        Self {
            reactor,
            fd,
            state: State::Start,
        }
    }
}

impl Future for AcceptFuture {
    /// Accepted connection fd, or the negative kernel error (spec.md §4.2).
    type Output = i32;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<i32> {
        let this = self.get_mut();
        match this.state {
            State::Start => {
                let idx = this.reactor.register_op(OpKind::Accept);
                this.reactor.set_waker(idx, cx.waker().clone());
                this.reactor.submit_accept(idx, this.fd);
                this.state = State::InFlight(idx);
                Poll::Pending
            }
            State::InFlight(idx) => match this.reactor.take_result(idx) {
                Some(result) => {
                    this.reactor.finish_op(idx);
                    Poll::Ready(result)
                }
                None => {
                    this.reactor.set_waker(idx, cx.waker().clone());
                    Poll::Pending
                }
            },
        }
    }
}

pub struct ReadFuture {
    reactor: Rc<Reactor>,
    fd: i32,
    state: State,
}

impl ReadFuture {
    pub fn new(reactor: Rc<Reactor>, fd: i32) -> Self {
        Self {
            reactor,
            fd,
            state: State::Start,
        }
    }
}

impl Future for ReadFuture {
    /// `(bytes read, filled buffer)`. 0 bytes on EOF or error; the parser
    /// treats both identically (spec.md §4.2).
    type Output = (usize, Box<[u8; 256]>);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.state {
            State::Start => {
                let idx = this.reactor.register_op(OpKind::Read {
                    buf: Box::new([0u8; 256]),
                });
                this.reactor.set_waker(idx, cx.waker().clone());
                let buf_ptr = this
                    .reactor
                    .with_op_mut(idx, |kind| match kind {
                        OpKind::Read { buf } => buf.as_mut_ptr(),
                        _ => unreachable!(),
                    })
                    .expect("op just registered");
                this.reactor.submit_read(idx, this.fd, buf_ptr, 256);
                this.state = State::InFlight(idx);
                Poll::Pending
            }
            State::InFlight(idx) => match this.reactor.take_result(idx) {
                Some(result) => {
                    let kind = this.reactor.finish_op(idx);
                    let buf = match kind {
                        OpKind::Read { buf } => buf,
                        _ => unreachable!(),
                    };
                    let n = if result > 0 { result as usize } else { 0 };
                    Poll::Ready((n, buf))
                }
                None => {
                    this.reactor.set_waker(idx, cx.waker().clone());
                    Poll::Pending
                }
            },
        }
    }
}

pub struct WriteFuture {
    reactor: Rc<Reactor>,
    fd: i32,
    buf: Rc<Vec<u8>>,
    offset: usize,
    len: usize,
    state: State,
}

impl WriteFuture {
    pub fn new(reactor: Rc<Reactor>, fd: i32, buf: Rc<Vec<u8>>, offset: usize, len: usize) -> Self {
        Self {
            reactor,
            fd,
            buf,
            offset,
            len,
            state: State::Start,
        }
    }
}

impl Future for WriteFuture {
    /// Bytes written; 0 on error (spec.md §4.2). The caller treats a short
    /// or zero write as connection loss.
    type Output = usize;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<usize> {
        let this = self.get_mut();
        match this.state {
            State::Start => {
                let idx = this.reactor.register_op(OpKind::Write {
                    buf: this.buf.clone(),
                    offset: this.offset,
                    len: this.len,
                });
                this.reactor.set_waker(idx, cx.waker().clone());
                let ptr = unsafe { this.buf.as_ptr().add(this.offset) };
                this.reactor
                    .submit_write(idx, this.fd, ptr, this.len as u32);
                this.state = State::InFlight(idx);
                Poll::Pending
            }
            State::InFlight(idx) => match this.reactor.take_result(idx) {
                Some(result) => {
                    this.reactor.finish_op(idx);
                    Poll::Ready(if result > 0 { result as usize } else { 0 })
                }
                None => {
                    this.reactor.set_waker(idx, cx.waker().clone());
                    Poll::Pending
                }
            },
        }
    }
}
