// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/serial.rs - 串行化检测器调用
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  sync::mpsc::{self, Sender, SyncSender},
  thread::{self, JoinHandle},
};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::Detector;

#[derive(Error, Debug)]
pub enum SerialDetectorError<E> {
  #[error("检测器工作线程已退出")]
  WorkerGone,
  #[error(transparent)]
  Detector(E),
}

type Reply<D> = Result<<D as Detector>::Output, <D as Detector>::Error>;

struct Request<D: Detector> {
  image: RgbImage,
  reply: Sender<Reply<D>>,
}

/// 把不支持并发调用的检测器放到独立线程中，所有请求经单槽队列依次处理
pub struct SerialDetector<D: Detector> {
  queue: Option<SyncSender<Request<D>>>,
  worker: Option<JoinHandle<()>>,
}

impl<D> SerialDetector<D>
where
  D: Detector + Send + 'static,
  D::Output: Send + 'static,
{
  pub fn spawn(detector: D) -> Self {
    let (queue, requests) = mpsc::sync_channel::<Request<D>>(1);
    let worker = thread::spawn(move || {
      info!("检测器工作线程启动");
      for request in requests {
        let result = detector.detect(&request.image);
        if request.reply.send(result).is_err() {
          warn!("检测结果无人接收，调用方已放弃");
        }
      }
      debug!("检测器工作线程退出");
    });
    Self {
      queue: Some(queue),
      worker: Some(worker),
    }
  }
}

impl<D> Detector for SerialDetector<D>
where
  D: Detector,
  D::Output: Send,
{
  type Output = D::Output;
  type Error = SerialDetectorError<D::Error>;

  fn detect(&self, image: &RgbImage) -> Result<Self::Output, Self::Error> {
    let queue = self.queue.as_ref().ok_or(SerialDetectorError::WorkerGone)?;
    let (reply, result) = mpsc::channel();
    queue
      .send(Request {
        image: image.clone(),
        reply,
      })
      .map_err(|_| SerialDetectorError::WorkerGone)?;
    result
      .recv()
      .map_err(|_| SerialDetectorError::WorkerGone)?
      .map_err(SerialDetectorError::Detector)
  }
}

impl<D: Detector> Drop for SerialDetector<D> {
  fn drop(&mut self) {
    // 先关闭队列，工作线程才会退出循环
    self.queue.take();
    if let Some(worker) = self.worker.take() {
      if worker.join().is_err() {
        warn!("检测器工作线程异常退出");
      }
    }
  }
}
